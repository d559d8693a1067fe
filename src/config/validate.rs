// src/config/validate.rs

use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile};
use crate::engine::SchedulerOptions;
use crate::errors::{Result, StackctlError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StackctlError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let options = scheduler_options(&raw.config)?;
        let settle_time = duration_field("backend.settle_time", &raw.backend.settle_time)?;
        Ok(ConfigFile::new_unchecked(
            raw.project,
            raw.backend,
            raw.stack,
            options,
            settle_time,
        ))
    }
}

/// Names end up in remote identifiers, so keep them to a conservative alphabet.
const NAME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9-]*$";

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    let names = Regex::new(NAME_PATTERN).map_err(anyhow::Error::from)?;
    validate_project(cfg, &names)?;
    ensure_has_stacks(cfg)?;
    validate_stacks(cfg, &names)?;
    validate_dependencies(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn validate_project(cfg: &RawConfigFile, names: &Regex) -> Result<()> {
    let name = cfg.project.name.trim();
    if name.is_empty() {
        return Err(StackctlError::ConfigError(
            "[project].name must not be empty".to_string(),
        ));
    }
    if !names.is_match(name) {
        return Err(StackctlError::ConfigError(format!(
            "[project].name '{name}' must start with a letter and contain only letters, digits and '-'"
        )));
    }
    Ok(())
}

fn ensure_has_stacks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stack.is_empty() {
        return Err(StackctlError::ConfigError(
            "config must contain at least one [stack.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_stacks(cfg: &RawConfigFile, names: &Regex) -> Result<()> {
    for (name, stack) in cfg.stack.iter() {
        if !names.is_match(name) {
            return Err(StackctlError::ConfigError(format!(
                "stack name '{name}' must start with a letter and contain only letters, digits and '-'"
            )));
        }
        match (&stack.template, &stack.template_body) {
            (Some(_), Some(_)) => {
                return Err(StackctlError::ConfigError(format!(
                    "stack '{name}' sets both `template` and `template_body`"
                )));
            }
            (None, None) => {
                return Err(StackctlError::ConfigError(format!(
                    "stack '{name}' needs a `template` path or a `template_body`"
                )));
            }
            (Some(path), None) if path.trim().is_empty() => {
                return Err(StackctlError::ConfigError(format!(
                    "stack '{name}' has an empty `template` path"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, stack) in cfg.stack.iter() {
        for dep in stack.depends_on.iter() {
            if dep == name {
                return Err(StackctlError::ConfigError(format!(
                    "stack '{name}' cannot depend on itself in `depends_on`"
                )));
            }
            if !cfg.stack.contains_key(dep) {
                return Err(StackctlError::ConfigError(format!(
                    "stack '{name}' has unknown dependency '{dep}' in `depends_on`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stack.keys() {
        graph.add_node(name.as_str());
    }
    for (name, stack) in cfg.stack.iter() {
        for dep in stack.depends_on.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        StackctlError::DependencyCycle(format!(
            "cycle detected in stack dependencies involving stack '{}'",
            cycle.node_id()
        ))
    })
}

fn scheduler_options(section: &ConfigSection) -> Result<SchedulerOptions> {
    let operation_timeout = section
        .operation_timeout
        .as_deref()
        .map(|s| duration_field("config.operation_timeout", s))
        .transpose()?;

    Ok(SchedulerOptions {
        dependency_poll_interval: positive_duration(
            "config.dependency_poll_interval",
            &section.dependency_poll_interval,
        )?,
        termination_poll_interval: positive_duration(
            "config.termination_poll_interval",
            &section.termination_poll_interval,
        )?,
        status_poll_interval: positive_duration(
            "config.status_poll_interval",
            &section.status_poll_interval,
        )?,
        tail_interval: positive_duration("config.tail_interval", &section.tail_interval)?,
        operation_timeout,
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| StackctlError::ConfigError(format!("{field}: {e}")))
}

/// Poll intervals feed `tokio::time::interval`, which rejects zero.
fn positive_duration(field: &str, value: &str) -> Result<Duration> {
    let duration = duration_field(field, value)?;
    if duration.is_zero() {
        return Err(StackctlError::ConfigError(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(duration)
}
