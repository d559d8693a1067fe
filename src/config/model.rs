// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::SchedulerOptions;

/// Top-level configuration exactly as read from a TOML file.
///
/// ```toml
/// [project]
/// name = "demo"
///
/// [config]
/// dependency_poll_interval = "1s"
///
/// [backend]
/// state_dir = ".stackctl"
///
/// [stack.network]
/// template = "templates/network.json"
///
/// [stack.app]
/// template = "templates/app.json"
/// depends_on = ["network"]
/// ```
///
/// Use `ConfigFile::try_from` to obtain a validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub project: ProjectSection,

    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub backend: BackendSection,

    /// All stacks from `[stack.<name>]`, keyed by logical stack name.
    #[serde(default)]
    pub stack: BTreeMap<String, StackConfig>,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Prefix of every remote stack name (`<project>-<stack>`).
    pub name: String,
}

/// `[config]` section: scheduler timing, as duration strings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    #[serde(default = "default_dependency_poll_interval")]
    pub dependency_poll_interval: String,

    #[serde(default = "default_termination_poll_interval")]
    pub termination_poll_interval: String,

    /// Interval used when waiting for a remote operation to settle.
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval: String,

    #[serde(default = "default_tail_interval")]
    pub tail_interval: String,

    /// Upper bound on a single deploy/terminate call. Unbounded if absent.
    #[serde(default)]
    pub operation_timeout: Option<String>,
}

fn default_dependency_poll_interval() -> String {
    "1s".to_string()
}

fn default_termination_poll_interval() -> String {
    "1500ms".to_string()
}

fn default_status_poll_interval() -> String {
    "1500ms".to_string()
}

fn default_tail_interval() -> String {
    "1300ms".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            dependency_poll_interval: default_dependency_poll_interval(),
            termination_poll_interval: default_termination_poll_interval(),
            status_poll_interval: default_status_poll_interval(),
            tail_interval: default_tail_interval(),
            operation_timeout: None,
        }
    }
}

/// `[backend]` section for the local provisioning backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    /// Directory holding stack records, relative to the config file.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Simulated time for a remote operation to settle.
    #[serde(default = "default_settle_time")]
    pub settle_time: String,
}

fn default_state_dir() -> String {
    ".stackctl".to_string()
}

fn default_settle_time() -> String {
    "2s".to_string()
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            settle_time: default_settle_time(),
        }
    }
}

/// `[stack.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackConfig {
    /// Path of the template file, relative to the config file.
    #[serde(default)]
    pub template: Option<String>,

    /// Inline template body; mutually exclusive with `template`.
    #[serde(default)]
    pub template_body: Option<String>,

    /// Stacks that must be deployed before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Validated configuration.
///
/// Built from a [`RawConfigFile`] through `TryFrom`, which also parses the
/// duration strings into [`SchedulerOptions`] and a settle time.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project: ProjectSection,
    pub backend: BackendSection,
    pub stack: BTreeMap<String, StackConfig>,
    pub options: SchedulerOptions,
    pub settle_time: Duration,
}

impl ConfigFile {
    /// Assemble a config without running validation.
    pub(crate) fn new_unchecked(
        project: ProjectSection,
        backend: BackendSection,
        stack: BTreeMap<String, StackConfig>,
        options: SchedulerOptions,
        settle_time: Duration,
    ) -> Self {
        Self {
            project,
            backend,
            stack,
            options,
            settle_time,
        }
    }
}
