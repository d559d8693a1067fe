// src/stack/set.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ConfigFile;
use crate::dag::StackGraph;
use crate::errors::{Result, StackctlError};
use crate::fs::FileSystem;
use crate::stack::model::{remote_name, Stack};
use crate::types::StackName;

/// All stacks known to one run, keyed by logical name.
///
/// Every stack is present, actioned or not: unactioned stacks may still be
/// queried as dependencies or waited on as dependents.
#[derive(Debug, Clone)]
pub struct StackSet {
    project: String,
    stacks: BTreeMap<StackName, Stack>,
    /// Template files not read yet, resolved against the config root.
    template_files: BTreeMap<StackName, PathBuf>,
}

impl StackSet {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stacks: BTreeMap::new(),
            template_files: BTreeMap::new(),
        }
    }

    /// Build the stack collection from a validated config. Nothing is
    /// actioned yet and template files are only located, not read: see
    /// [`StackSet::load_templates`].
    pub fn from_config(cfg: &ConfigFile, root: &Path) -> Self {
        let mut set = StackSet::new(cfg.project.name.clone());

        for (name, sc) in cfg.stack.iter() {
            let mut stack = Stack::new(&set.project, name.clone())
                .with_dependencies(sc.depends_on.iter().cloned());
            match (&sc.template, &sc.template_body) {
                (Some(path), _) => {
                    set.template_files.insert(name.clone(), root.join(path));
                }
                (None, Some(body)) => stack = stack.with_template(body.clone()),
                (None, None) => {}
            }
            set.insert(stack);
        }

        set
    }

    /// Read the template of every actioned stack.
    ///
    /// Stacks outside the selection are left alone, so a broken template
    /// only blocks commands that would send it.
    pub fn load_templates(&mut self, fs: &dyn FileSystem) -> Result<()> {
        for stack in self.stacks.values_mut().filter(|s| s.actioned) {
            if let Some(path) = self.template_files.remove(&stack.name) {
                debug!(stack = %stack.name, path = %path.display(), "reading template");
                stack.template = fs.read_to_string(&path).map_err(|e| {
                    StackctlError::ConfigError(format!(
                        "stack '{}': cannot read template {}: {e:#}",
                        stack.name,
                        path.display()
                    ))
                })?;
            }

            if stack.template.trim().is_empty() {
                return Err(StackctlError::ConfigError(format!(
                    "stack '{}' has an empty template",
                    stack.name
                )));
            }
        }
        Ok(())
    }

    /// Add a stack. Its remote name is re-derived from this set's project so
    /// the `(project, name) -> remote_name` mapping holds for every member.
    pub fn insert(&mut self, mut stack: Stack) {
        stack.remote_name = remote_name(&self.project, &stack.name);
        self.stacks.insert(stack.name.clone(), stack);
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn get(&self, name: &str) -> Option<&Stack> {
        self.stacks.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn actioned(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values().filter(|s| s.actioned)
    }

    pub fn actioned_names(&self) -> Vec<StackName> {
        self.actioned().map(|s| s.name.clone()).collect()
    }

    /// Mark the named stacks as actioned; an empty list selects every stack.
    pub fn select(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            self.select_all();
            return Ok(());
        }
        for name in names {
            match self.stacks.get_mut(name) {
                Some(stack) => stack.actioned = true,
                None => return Err(StackctlError::StackNotFound(name.clone())),
            }
        }
        Ok(())
    }

    pub fn select_all(&mut self) {
        for stack in self.stacks.values_mut() {
            stack.actioned = true;
        }
    }

    /// Stacks (actioned or not) that list `name` in their `depends_on`.
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Stack> + 'a {
        self.stacks.values().filter(move |s| s.depends_on(name))
    }

    /// Configuration checks that must pass before any scheduler starts:
    /// every dependency resolves and the graph is acyclic.
    pub fn validate_for_run(&self) -> Result<()> {
        StackGraph::from_stacks(self)?.ensure_acyclic()
    }
}
