//! Configuration file support for the router

use super::clarify::clarifier_agent;
use super::classifier::Architecture;
use super::embedder::{DEFAULT_DIMENSION, DEFAULT_EMBED_MODEL};
use super::router::RouteTable;
use super::types::{AgentConfig, Category};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub ollama: OllamaSettings,

    #[serde(default)]
    pub embedder: EmbedderSettings,

    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    /// Agent per category name (`code`, `reason`, `language`, `search`)
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, AgentConfig>,

    /// Agent for queries classified as `unknown`
    #[serde(default = "default_fallback")]
    pub fallback: AgentConfig,

    /// Agent that asks clarifying questions about a vague query
    #[serde(default = "clarifier_agent")]
    pub clarifier: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    #[serde(default = "default_embed_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// JSON weight artifact
    #[serde(default = "default_weights")]
    pub weights: PathBuf,

    /// Hidden layer widths; the reference network when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_units: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Model that picks a tool for direct tool calls
    #[serde(default = "default_tool_model")]
    pub model: String,
}

// Defaults

fn default_host() -> String {
    ollama::DEFAULT_HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_weights() -> PathBuf {
    PathBuf::from("query_classifier.json")
}

fn default_tool_model() -> String {
    "gemma3:4b".to_string()
}

fn default_routes() -> BTreeMap<String, AgentConfig> {
    RouteTable::reference()
        .entries()
        .into_iter()
        .filter(|(category, _)| !category.is_unknown())
        .map(|(category, agent)| (category.to_string(), agent.clone()))
        .collect()
}

fn default_fallback() -> AgentConfig {
    RouteTable::reference().fallback().clone()
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            model: default_embed_model(),
            dimension: default_dimension(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            hidden_units: None,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            model: default_tool_model(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ollama: OllamaSettings::default(),
            embedder: EmbedderSettings::default(),
            classifier: ClassifierSettings::default(),
            tools: ToolSettings::default(),
            routes: default_routes(),
            fallback: default_fallback(),
            clarifier: clarifier_agent(),
        }
    }
}

impl RouterConfig {
    /// `<config dir>/query-router/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("query-router").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, else the default file if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.timeout_secs == 0 {
            return Err(ConfigError::Invalid("ollama.timeout_secs must be positive".to_string()));
        }
        if self.embedder.dimension == 0 {
            return Err(ConfigError::Invalid("embedder.dimension must be positive".to_string()));
        }
        self.route_table().map(|_| ())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }

    /// Network shape the weight artifact must match
    pub fn architecture(&self) -> Architecture {
        match &self.classifier.hidden_units {
            Some(units) => Architecture::feed_forward(self.embedder.dimension, units),
            None => Architecture {
                input_dim: self.embedder.dimension,
                ..Architecture::reference()
            },
        }
    }

    /// Build the route table from the `[routes.*]` and `[fallback]` sections
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        let mut routes = HashMap::new();
        for (key, agent) in &self.routes {
            let category: Category = key
                .parse()
                .map_err(|_| ConfigError::UnknownCategory(key.clone()))?;
            if category.is_unknown() {
                return Err(ConfigError::Invalid(
                    "configure the `unknown` route through [fallback]".to_string(),
                ));
            }
            routes.insert(category, agent.clone());
        }
        Ok(RouteTable::new(routes, self.fallback.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown category in routes: {0}")]
    UnknownCategory(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
