// tests/graph_properties.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use stackctl::dag::StackGraph;
use stackctl::errors::StackctlError;
use stackctl::stack::StackSet;
use stackctl_test_utils::builders::StackSetBuilder;

// Acyclic by construction: stack N may only depend on stacks 0..N-1.
fn dag_strategy(max_stacks: usize) -> impl Strategy<Value = StackSet> {
    (1..=max_stacks).prop_flat_map(|count| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..count), count)
            .prop_map(move |raw_deps| {
                let mut builder = StackSetBuilder::new("prop");
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    let deps: HashSet<String> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| format!("s{}", d % i)).collect()
                    };
                    let mut deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                    deps.sort();
                    builder = builder.stack(&format!("s{i}"), &deps);
                }
                builder.action_all().build()
            })
    })
}

proptest! {
    #[test]
    fn test_waves_respect_every_dependency(stacks in dag_strategy(12)) {
        let graph = StackGraph::from_stacks(&stacks).unwrap();
        let waves = graph.waves().unwrap();

        let mut wave_of = HashMap::new();
        for (index, wave) in waves.iter().enumerate() {
            for name in wave {
                prop_assert!(wave_of.insert(name.clone(), index).is_none(), "{} listed twice", name);
            }
        }
        prop_assert_eq!(wave_of.len(), stacks.len());

        for stack in stacks.iter() {
            for dep in &stack.depends_on {
                prop_assert!(wave_of[dep] < wave_of[&stack.name]);
            }
        }
        // Every wave after the first has a member that waits on the one before.
        for (index, wave) in waves.iter().enumerate().skip(1) {
            let waits_on_previous = wave.iter().any(|name| {
                graph.dependencies_of(name).iter().any(|dep| wave_of[dep] == index - 1)
            });
            prop_assert!(waits_on_previous);
        }
    }

    #[test]
    fn test_dependents_mirror_dependencies(stacks in dag_strategy(12)) {
        let graph = StackGraph::from_stacks(&stacks).unwrap();
        for stack in stacks.iter() {
            for dep in graph.dependencies_of(&stack.name) {
                prop_assert!(graph.dependents_of(dep).contains(&stack.name));
            }
            let from_set: HashSet<&str> =
                stacks.dependents_of(&stack.name).map(|s| s.name.as_str()).collect();
            let from_graph: HashSet<&str> =
                graph.dependents_of(&stack.name).iter().map(String::as_str).collect();
            prop_assert_eq!(from_set, from_graph);
        }
    }

    #[test]
    fn test_closing_a_back_edge_is_a_cycle(stacks in dag_strategy(8), pick in any::<usize>()) {
        // Find any edge dep -> stack and add stack -> dep to close a cycle.
        let edges: Vec<(String, String)> = stacks
            .iter()
            .flat_map(|s| s.depends_on.iter().map(move |d| (s.name.clone(), d.clone())))
            .collect();
        prop_assume!(!edges.is_empty());
        let (dependent, dependency) = edges[pick % edges.len()].clone();

        let mut cyclic = stacks.clone();
        let mut reversed = cyclic.get(&dependency).unwrap().clone();
        reversed.depends_on.push(dependent);
        cyclic.insert(reversed);

        let result = cyclic.validate_for_run();
        prop_assert!(matches!(result, Err(StackctlError::DependencyCycle(_))));
    }
}
