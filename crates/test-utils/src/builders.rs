#![allow(dead_code)]

use std::collections::BTreeMap;

use stackctl::config::{
    BackendSection, ConfigFile, ConfigSection, ProjectSection, RawConfigFile, StackConfig,
};
use stackctl::stack::{Stack, StackSet};

/// Builder for `StackSet` to simplify scheduler tests.
///
/// Every stack gets a non-empty template. Nothing is actioned unless
/// `action` or `action_all` is called.
pub struct StackSetBuilder {
    set: StackSet,
}

impl StackSetBuilder {
    pub fn new(project: &str) -> Self {
        Self {
            set: StackSet::new(project),
        }
    }

    pub fn stack(mut self, name: &str, deps: &[&str]) -> Self {
        let stack = Stack::new(self.set.project(), name)
            .with_dependencies(deps.iter().copied())
            .with_template(format!("{{\"Resources\": {{\"{name}\": {{}}}}}}"));
        self.set.insert(stack);
        self
    }

    pub fn stack_with_template(mut self, name: &str, deps: &[&str], template: &str) -> Self {
        let stack = Stack::new(self.set.project(), name)
            .with_dependencies(deps.iter().copied())
            .with_template(template);
        self.set.insert(stack);
        self
    }

    pub fn action(mut self, names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.set
            .select(&names)
            .expect("actioned stack must be added before it is selected");
        self
    }

    pub fn action_all(mut self) -> Self {
        self.set.select_all();
        self
    }

    pub fn build(self) -> StackSet {
        self.set
    }
}

/// Builder for `ConfigFile` to simplify config tests.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(project: &str) -> Self {
        Self {
            config: RawConfigFile {
                project: ProjectSection {
                    name: project.to_string(),
                },
                config: ConfigSection::default(),
                backend: BackendSection::default(),
                stack: BTreeMap::new(),
            },
        }
    }

    pub fn with_stack(mut self, name: &str, stack: StackConfig) -> Self {
        self.config.stack.insert(name.to_string(), stack);
        self
    }

    pub fn with_dependency_poll_interval(mut self, value: &str) -> Self {
        self.config.config.dependency_poll_interval = value.to_string();
        self
    }

    pub fn with_operation_timeout(mut self, value: &str) -> Self {
        self.config.config.operation_timeout = Some(value.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `StackConfig`.
pub struct StackConfigBuilder {
    stack: StackConfig,
}

impl StackConfigBuilder {
    /// Stack whose template is read from `path`.
    pub fn file(path: &str) -> Self {
        Self {
            stack: StackConfig {
                template: Some(path.to_string()),
                ..StackConfig::default()
            },
        }
    }

    /// Stack with an inline template body.
    pub fn inline(body: &str) -> Self {
        Self {
            stack: StackConfig {
                template_body: Some(body.to_string()),
                ..StackConfig::default()
            },
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.stack.depends_on.push(dep.to_string());
        self
    }

    pub fn build(self) -> StackConfig {
        self.stack
    }
}
