// Tools - statically declared registry and JSON tool-call dispatch
//
// An LLM picks a tool by answering with `{"name": ..., "arguments": {...}}`.
// The registry resolves the name, checks the arguments against the declared
// parameters and only then runs the handler.

use ollama::{ChatRequest, Message, OllamaClient};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Keyword arguments of a tool call
pub type ToolArgs = serde_json::Map<String, Value>;

type Handler = Arc<dyn Fn(&ToolArgs) -> Result<Value, String> + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Number,
    Integer,
    String,
    Boolean,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::String => "string",
            ParamKind::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::String => value.is_string(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// `name(x: number, y?: string)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{}: {}", p.name, marker, p.kind.as_str())
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    fn validate(&self) -> Result<(), ToolError> {
        if !is_identifier(&self.name) {
            return Err(ToolError::Registration(format!("invalid tool name `{}`", self.name)));
        }
        let mut seen = HashSet::new();
        for param in &self.params {
            if !is_identifier(&param.name) {
                return Err(ToolError::Registration(format!(
                    "tool `{}` has invalid parameter name `{}`",
                    self.name, param.name
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ToolError::Registration(format!(
                    "tool `{}` declares parameter `{}` twice",
                    self.name, param.name
                )));
            }
        }
        Ok(())
    }

    fn check_arguments(&self, args: &ToolArgs) -> Result<(), ToolError> {
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        for key in args.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(invalid(format!("unexpected parameter `{key}`")));
            }
        }

        for param in &self.params {
            match args.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(invalid(format!("missing required parameter `{}`", param.name)));
                }
                None | Some(Value::Null) => {}
                Some(value) if !param.kind.accepts(value) => {
                    return Err(invalid(format!(
                        "parameter `{}` must be a {}, got {value}",
                        param.name,
                        param.kind.as_str()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone)]
struct RegisteredTool {
    spec: ToolSpec,
    handler: Handler,
}

/// Tools by name. Declared up front; nothing is discovered at runtime.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names and parameter lists are validated here so a
    /// bad declaration fails at startup rather than on first use.
    pub fn register<F>(&mut self, spec: ToolSpec, handler: F) -> Result<(), ToolError>
    where
        F: Fn(&ToolArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        spec.validate()?;
        if self.tools.contains_key(&spec.name) {
            return Err(ToolError::Registration(format!("tool `{}` is already registered", spec.name)));
        }
        self.tools.insert(
            spec.name.clone(),
            RegisteredTool {
                spec,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve `call.name` and run the tool with `call.arguments`
    pub fn invoke(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        tool.spec.check_arguments(&call.arguments)?;

        tracing::debug!(tool = %call.name, arguments = ?call.arguments, "invoking tool");
        (tool.handler)(&call.arguments).map_err(|reason| ToolError::Execution {
            tool: call.name.clone(),
            reason,
        })
    }

    /// One line per tool, sorted by name: `name(x: number) - description`,
    /// followed by an indented line for each documented parameter
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for tool in self.tools.values() {
            lines.push(format!("{} - {}", tool.spec.signature(), tool.spec.description));
            for param in tool.spec.params.iter().filter(|p| !p.description.is_empty()) {
                lines.push(format!("    {}: {}", param.name, param.description));
            }
        }
        lines.join("\n")
    }

    /// A registry holding only the named tools
    pub fn subset(&self, names: &[String]) -> Result<ToolRegistry, ToolError> {
        let mut tools = BTreeMap::new();
        for name in names {
            let tool = self
                .tools
                .get(name)
                .ok_or_else(|| ToolError::NotFound(name.clone()))?;
            tools.insert(name.clone(), tool.clone());
        }
        Ok(ToolRegistry { tools })
    }

    /// `multiply` and `add`
    pub fn arithmetic() -> Result<Self, ToolError> {
        let mut registry = Self::new();

        registry.register(
            ToolSpec::new("multiply", "Multiply two numbers together.")
                .param(ParamSpec::required("x", ParamKind::Number))
                .param(ParamSpec::required("y", ParamKind::Number)),
            |args| {
                let product = number(args, "x")? * number(args, "y")?;
                if !product.is_finite() {
                    return Err("result is not finite".to_string());
                }
                Ok(json!(product))
            },
        )?;

        registry.register(
            ToolSpec::new("add", "Add two integers.")
                .param(ParamSpec::required("x", ParamKind::Integer))
                .param(ParamSpec::required("y", ParamKind::Integer)),
            |args| {
                integer(args, "x")?
                    .checked_add(integer(args, "y")?)
                    .map(|sum| json!(sum))
                    .ok_or_else(|| "integer overflow".to_string())
            },
        )?;

        Ok(registry)
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Read a numeric argument
pub fn number(args: &ToolArgs, name: &str) -> Result<f64, String> {
    args.get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("`{name}` is not a number"))
}

/// Read an integer argument
pub fn integer(args: &ToolArgs, name: &str) -> Result<i64, String> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("`{name}` is not an integer"))
}

/// Tool selection as produced by a model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArgs,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Parse a model response, tolerating a surrounding markdown code fence
    pub fn parse(text: &str) -> Result<Self, ToolError> {
        let body = strip_code_fence(text.trim());
        serde_json::from_str(body)
            .map_err(|e| ToolError::Selection(format!("invalid tool call ({e}): {text}")))
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    let body = match rest.split_once('\n') {
        // Drop the info string (```json) line
        Some((_, body)) => body,
        // One-line fence: the info string ends at the first brace or space
        None => rest
            .find(|c: char| c == '{' || c.is_whitespace())
            .map_or("", |start| &rest[start..]),
    };
    body.trim()
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub call: ToolCall,
    pub output: Value,
}

impl ToolOutcome {
    /// Output as plain text: strings unquoted, everything else as JSON
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Asks a model to choose a tool for the input, then runs it
pub struct ToolCaller {
    client: OllamaClient,
    model: String,
    registry: Arc<ToolRegistry>,
}

impl ToolCaller {
    pub fn new(client: OllamaClient, model: impl Into<String>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            model: model.into(),
            registry,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are an assistant with access to the following tools:

{}

Given the user input, choose the tool to use and its arguments.
Respond with a JSON object with exactly two keys:
  "name": the tool name
  "arguments": an object mapping each parameter name to its value

Respond ONLY with valid JSON, no other text."#,
            self.registry.render()
        )
    }

    /// Ask the model which tool to call
    pub async fn select(&self, input: &str) -> Result<ToolCall, ToolError> {
        let request = ChatRequest::new(
            self.model.clone(),
            vec![Message::system(self.system_prompt()), Message::user(input)],
        )
        .with_format(json!("json"));

        let response = self
            .client
            .chat(&request)
            .await
            .map_err(|e| ToolError::Selection(e.to_string()))?;

        ToolCall::parse(&response.message.content)
    }

    /// Select a tool and invoke it
    pub async fn call(&self, input: &str) -> Result<ToolOutcome, ToolError> {
        let call = self.select(input).await?;
        tracing::info!(tool = %call.name, model = %self.model, "model selected tool");
        let output = self.registry.invoke(&call)?;
        Ok(ToolOutcome { call, output })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool registration error: {0}")]
    Registration(String),

    #[error("Invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool `{tool}` failed: {reason}")]
    Execution { tool: String, reason: String },

    #[error("Tool selection failed: {0}")]
    Selection(String),
}
