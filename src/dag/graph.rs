// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, StackctlError};
use crate::stack::StackSet;
use crate::types::StackName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Stacks that must be complete before this one deploys.
    deps: Vec<StackName>,
    /// Stacks that must be gone before this one terminates.
    dependents: Vec<StackName>,
}

/// Adjacency view over a [`StackSet`].
#[derive(Debug, Clone)]
pub struct StackGraph {
    nodes: BTreeMap<StackName, DagNode>,
}

impl StackGraph {
    /// Build the graph, rejecting `depends_on` entries that name no stack.
    pub fn from_stacks(stacks: &StackSet) -> Result<Self> {
        let mut nodes: BTreeMap<StackName, DagNode> = stacks
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    DagNode {
                        deps: s.depends_on.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for stack in stacks.iter() {
            for dep in &stack.depends_on {
                match nodes.get_mut(dep) {
                    Some(node) => node.dependents.push(stack.name.clone()),
                    None => {
                        return Err(StackctlError::ConfigError(format!(
                            "stack '{}' depends on unknown stack '{}'",
                            stack.name, dep
                        )));
                    }
                }
            }
        }

        Ok(Self { nodes })
    }

    pub fn dependencies_of(&self, name: &str) -> &[StackName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[StackName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Fail with [`StackctlError::DependencyCycle`] if any cycle exists.
    pub fn ensure_acyclic(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }

    /// Group stacks into deployment waves: wave `n` only depends on stacks in
    /// earlier waves. Reverse the result for termination order.
    pub fn waves(&self) -> Result<Vec<Vec<StackName>>> {
        let order = self.topological_order()?;
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<StackName>> = Vec::new();

        for name in order {
            let d = self
                .dependencies_of(name)
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(name, d);
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(name.to_string());
        }

        for wave in waves.iter_mut() {
            wave.sort();
        }
        Ok(waves)
    }

    fn topological_order(&self) -> Result<Vec<&str>> {
        // Edge direction: dependency -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (name, node) in self.nodes.iter() {
            graph.add_node(name.as_str());
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            StackctlError::DependencyCycle(format!(
                "cycle detected in stack dependencies involving stack '{}'",
                cycle.node_id()
            ))
        })
    }
}
