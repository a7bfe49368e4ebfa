// Core types for the routing system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Query category, used to select the agent that handles a query.
///
/// The set is closed. `Unknown` is never produced by the network itself;
/// it marks a query whose embedding or scoring failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Reason,
    Language,
    Search,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Code,
        Category::Reason,
        Category::Language,
        Category::Search,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Code => "code",
            Category::Reason => "reason",
            Category::Language => "language",
            Category::Search => "search",
            Category::Unknown => "unknown",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Category::Code => "Programming, implementation and debugging questions",
            Category::Reason => "Mathematical, logical and analytical problems",
            Category::Language => "General language tasks: writing, translation, explanation",
            Category::Search => "Factual questions that need current information",
            Category::Unknown => "Queries that could not be classified",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(Category::Code),
            "reason" => Ok(Category::Reason),
            "language" => Ok(Category::Language),
            "search" => Ok(Category::Search),
            "unknown" => Ok(Category::Unknown),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// An agent: a model plus the instructions it runs with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,

    /// Ollama model identifier, e.g. `qwen2.5-coder:3b`
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<String>,

    /// JSON schema the response must follow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    /// Names of registered tools this agent selects from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default = "default_markdown")]
    pub markdown: bool,

    #[serde(default)]
    pub add_datetime: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_markdown() -> bool {
    true
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            description: None,
            instructions: Vec::new(),
            schema: None,
            tools: Vec::new(),
            markdown: default_markdown(),
            add_datetime: false,
            temperature: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_datetime(mut self) -> Self {
        self.add_datetime = true;
        self
    }
}

/// Output of a single agent invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub agent: String,
    pub model: String,
    pub content: String,

    /// Parsed output when the agent has a schema or answered through a tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
}

impl AgentResponse {
    pub fn text(agent: &AgentConfig, content: impl Into<String>) -> Self {
        Self {
            agent: agent.name.clone(),
            model: agent.model.clone(),
            content: content.into(),
            structured: None,
            eval_count: None,
            total_duration_ms: None,
        }
    }

    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of processing one query end to end. Failures are carried as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub category: Category,
    pub agent: Option<String>,
    pub status: OutcomeStatus,
    pub response: Option<AgentResponse>,
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn success(query: impl Into<String>, category: Category, response: AgentResponse) -> Self {
        Self {
            query: query.into(),
            category,
            agent: Some(response.agent.clone()),
            status: OutcomeStatus::Success,
            response: Some(response),
            error: None,
        }
    }

    pub fn failed(
        query: impl Into<String>,
        category: Category,
        agent: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            category,
            agent,
            status: OutcomeStatus::Failed,
            response: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!("code".parse::<Category>().unwrap(), Category::Code);
        assert_eq!(" Reason ".parse::<Category>().unwrap(), Category::Reason);
        assert_eq!("UNKNOWN".parse::<Category>().unwrap(), Category::Unknown);
        assert!("math".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Category::Language).unwrap(), "\"language\"");
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
            assert!(!category.description().is_empty());
        }
    }

    #[test]
    fn test_agent_config_defaults_from_json() {
        let agent: AgentConfig =
            serde_json::from_str(r#"{"name": "coder", "model": "qwen2.5-coder:3b"}"#).unwrap();
        assert!(agent.markdown);
        assert!(!agent.add_datetime);
        assert!(agent.instructions.is_empty());
        assert_eq!(agent, AgentConfig::new("coder", "qwen2.5-coder:3b"));
    }

    #[test]
    fn test_outcome_constructors() {
        let agent = AgentConfig::new("general", "qwen2.5:3b");
        let ok = QueryOutcome::success("q", Category::Language, AgentResponse::text(&agent, "a"));
        assert!(ok.is_success());
        assert_eq!(ok.agent.as_deref(), Some("general"));

        let failed = QueryOutcome::failed("q", Category::Unknown, None, "boom");
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
