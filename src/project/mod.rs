//! Declarative crew configuration.
//!
//! A crew project is a directory with `agents.yaml` and `tasks.yaml`, plus
//! an optional `crew.yaml`. Catalog entries keep their declaration order,
//! which is also the task execution order. Every problem is reported as a
//! [`ConfigError`] with the dotted path of the offending entry.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::agent::{Agent, DEFAULT_MAX_ITER, DEFAULT_MAX_RETRY_LIMIT};
use crate::agent::utils::DEFAULT_DATE_FORMAT;
use crate::crew::{Crew, CrewBuilder};
use crate::llm::LLM;
use crate::llms::base_llm::LlmBackend;
use crate::process::Process;
use crate::task::{OutputSpec, Task};
use crate::tools::registry::ToolRegistry;
use crate::utilities::errors::{ConfigError, ConfigErrorKind};
use crate::utilities::output_validation::OutputPolicy;

static MISSING_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"missing field `([^`]+)`").expect("valid regex"));
static UNKNOWN_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"unknown field `([^`]+)`").expect("valid regex"));

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One entry of `agents.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display role; defaults to the entry key.
    #[serde(default)]
    pub role: Option<String>,
    pub goal: String,
    pub backstory: String,
    #[serde(default)]
    pub llm: Option<LLM>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub allow_delegation: bool,
    #[serde(default)]
    pub max_iter: Option<u32>,
    /// Seconds.
    #[serde(default)]
    pub max_execution_time: Option<u64>,
    #[serde(default)]
    pub max_rpm: Option<u32>,
    #[serde(default)]
    pub max_retry_limit: Option<u32>,
    #[serde(default)]
    pub inject_date: bool,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub output_policy: OutputPolicy,
}

/// One entry of `tasks.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub description: String,
    pub expected_output: OutputSpec,
    /// Role key of the responsible agent.
    pub agent: String,
    /// Upstream task names.
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub markdown: bool,
}

/// Optional `crew.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrewConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub process: Process,
    /// Seconds.
    #[serde(default)]
    pub max_run_time: Option<u64>,
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

/// Agents by role key, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentCatalog {
    entries: Vec<(String, AgentConfig)>,
}

impl AgentCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: parse_catalog(yaml, "agents")?,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read_config(path.as_ref())?)
    }

    pub fn get(&self, key: &str) -> Option<&AgentConfig> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build every agent, binding its tools from `registry`.
    pub fn build_agents(&self, registry: &ToolRegistry) -> Result<Vec<Agent>, ConfigError> {
        self.entries
            .iter()
            .map(|(key, config)| build_agent(key, config, registry))
            .collect()
    }
}

fn build_agent(key: &str, config: &AgentConfig, registry: &ToolRegistry) -> Result<Agent, ConfigError> {
    let path = format!("agents.{}", key);
    let tools = registry.bind(&config.tools, &format!("{}.tools", path))?;

    let mut agent = Agent::new(key, config.goal.trim(), config.backstory.trim())
        .role(config.role.as_deref().map(str::trim).unwrap_or(key))
        .llm(config.llm.clone().unwrap_or_default())
        .tools(tools)
        .max_iter(config.max_iter.unwrap_or(DEFAULT_MAX_ITER))
        .max_retry_limit(config.max_retry_limit.unwrap_or(DEFAULT_MAX_RETRY_LIMIT))
        .inject_date(config.inject_date)
        .date_format(config.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT))
        .output_policy(config.output_policy);
    agent.allow_delegation = config.allow_delegation;

    match config.max_execution_time {
        Some(0) => {
            return Err(ConfigError::invalid_schema(
                format!("{}.max_execution_time", path),
                "max_execution_time must be at least 1 second",
            ))
        }
        Some(secs) => agent = agent.max_execution_time(Duration::from_secs(secs)),
        None => {}
    }
    if let Some(rpm) = config.max_rpm {
        agent = agent.max_rpm(rpm);
    }
    Ok(agent)
}

/// Tasks by name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCatalog {
    entries: Vec<(String, TaskConfig)>,
}

impl TaskCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: parse_catalog(yaml, "tasks")?,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read_config(path.as_ref())?)
    }

    pub fn get(&self, name: &str) -> Option<&TaskConfig> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, c)| c)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build_tasks(&self) -> Vec<Task> {
        self.entries
            .iter()
            .map(|(name, config)| Task {
                name: name.clone(),
                description: config.description.trim().to_string(),
                expected_output: match &config.expected_output {
                    OutputSpec::Text(text) => OutputSpec::Text(text.trim().to_string()),
                    other => other.clone(),
                },
                agent: config.agent.clone(),
                context: config.context.clone(),
                markdown: config.markdown,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CrewBase
// ---------------------------------------------------------------------------

/// A crew project: catalogs, optional crew settings and the tool registry.
#[derive(Debug, Clone)]
pub struct CrewBase {
    pub agents: AgentCatalog,
    pub tasks: TaskCatalog,
    pub crew: CrewConfig,
    pub registry: ToolRegistry,
}

impl CrewBase {
    /// Load `agents.yaml`, `tasks.yaml` and, if present, `crew.yaml` from
    /// `config_dir`. Tools resolve against the built-in registry.
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = config_dir.as_ref();
        let crew_path = dir.join("crew.yaml");
        let crew = if crew_path.exists() {
            parse_document(&read_config(&crew_path)?, "crew")?
        } else {
            CrewConfig::default()
        };
        log::debug!("Loading crew configuration from {}", dir.display());
        Ok(Self {
            agents: AgentCatalog::from_file(dir.join("agents.yaml"))?,
            tasks: TaskCatalog::from_file(dir.join("tasks.yaml"))?,
            crew,
            registry: ToolRegistry::with_builtin_tools(),
        })
    }

    pub fn from_yaml(agents_yaml: &str, tasks_yaml: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            agents: AgentCatalog::from_yaml_str(agents_yaml)?,
            tasks: TaskCatalog::from_yaml_str(tasks_yaml)?,
            crew: CrewConfig::default(),
            registry: ToolRegistry::with_builtin_tools(),
        })
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// A builder populated with every agent and task, ready for extra
    /// settings such as a clock or a task callback.
    pub fn builder(&self, backend: Arc<dyn LlmBackend>) -> Result<CrewBuilder, ConfigError> {
        let mut builder = CrewBuilder::new(backend).process(self.crew.process);
        if let Some(name) = &self.crew.name {
            builder = builder.name(name.clone());
        }
        if let Some(secs) = self.crew.max_run_time {
            builder = builder.max_run_time(Duration::from_secs(secs));
        }
        for agent in self.agents.build_agents(&self.registry)? {
            builder = builder.agent(agent);
        }
        for task in self.tasks.build_tasks() {
            builder = builder.task(task);
        }
        Ok(builder)
    }

    pub fn crew(&self, backend: Arc<dyn LlmBackend>) -> Result<Crew, ConfigError> {
        self.builder(backend)?.build()
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| {
        let kind = if e.kind() == std::io::ErrorKind::NotFound {
            ConfigErrorKind::MissingField
        } else {
            ConfigErrorKind::InvalidSchema
        };
        ConfigError::new(kind, path.display().to_string(), format!("cannot read file: {}", e))
    })
}

/// A catalog entry type. Nested sections are parsed on their own first so
/// their errors carry the full path (`agents.x.llm.model`).
trait CatalogEntry: DeserializeOwned {
    const SECTIONS: &'static [&'static str] = &[];

    fn check_section(_value: &YamlValue, _path: &str) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl CatalogEntry for AgentConfig {
    const SECTIONS: &'static [&'static str] = &["llm"];

    fn check_section(value: &YamlValue, path: &str) -> Result<(), ConfigError> {
        parse_section::<LLM>(value, path)
    }
}

impl CatalogEntry for TaskConfig {
    const SECTIONS: &'static [&'static str] = &["expected_output"];

    fn check_section(value: &YamlValue, path: &str) -> Result<(), ConfigError> {
        parse_section::<OutputSpec>(value, path)
    }
}

fn parse_section<T: DeserializeOwned>(value: &YamlValue, path: &str) -> Result<(), ConfigError> {
    if value.is_null() {
        return Ok(());
    }
    serde_yaml::from_value::<T>(value.clone())
        .map(drop)
        .map_err(|e| schema_error(path, &e))
}

/// Parse a top-level mapping of `name -> entry`, keeping order.
fn parse_catalog<T: CatalogEntry>(yaml: &str, root: &str) -> Result<Vec<(String, T)>, ConfigError> {
    let document: YamlValue = serde_yaml::from_str(yaml)
        .map_err(|e| ConfigError::invalid_schema(root, format!("not valid YAML: {}", e)))?;
    let mapping: Mapping = match document {
        YamlValue::Mapping(mapping) => mapping,
        YamlValue::Null => Mapping::new(),
        _ => return Err(ConfigError::invalid_schema(root, "expected a mapping of names to entries")),
    };

    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = match key {
            YamlValue::String(name) if !name.trim().is_empty() => name,
            other => {
                return Err(ConfigError::invalid_schema(
                    root,
                    format!("entry names must be non-empty strings, got {:?}", other),
                ))
            }
        };
        let path = format!("{}.{}", root, name);
        if let YamlValue::Mapping(fields) = &value {
            for section in T::SECTIONS {
                if let Some(section_value) = fields.get(*section) {
                    T::check_section(section_value, &format!("{}.{}", path, section))?;
                }
            }
        }
        let entry = serde_yaml::from_value::<T>(value).map_err(|e| schema_error(&path, &e))?;
        entries.push((name, entry));
    }
    Ok(entries)
}

fn parse_document<T: DeserializeOwned>(yaml: &str, root: &str) -> Result<T, ConfigError> {
    let value = match serde_yaml::from_str(yaml)
        .map_err(|e| ConfigError::invalid_schema(root, format!("not valid YAML: {}", e)))?
    {
        YamlValue::Null => YamlValue::Mapping(Mapping::new()),
        value => value,
    };
    serde_yaml::from_value(value).map_err(|e| schema_error(root, &e))
}

/// Turn a serde error into a `ConfigError` pointing at the offending field.
fn schema_error(path: &str, err: &serde_yaml::Error) -> ConfigError {
    let message = err.to_string();
    if let Some(caps) = MISSING_FIELD_RE.captures(&message) {
        return ConfigError::missing_field(format!("{}.{}", path, &caps[1]), message.clone());
    }
    if let Some(caps) = UNKNOWN_FIELD_RE.captures(&message) {
        return ConfigError::invalid_schema(format!("{}.{}", path, &caps[1]), message.clone());
    }
    ConfigError::invalid_schema(path, message)
}
