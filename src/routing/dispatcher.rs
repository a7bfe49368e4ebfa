// Dispatcher - invokes the agent selected by the router

use super::tools::{ToolCaller, ToolError, ToolRegistry};
use super::types::{AgentConfig, AgentResponse};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use ollama::{ChatRequest, Message, OllamaClient};
use serde_json::json;
use std::sync::Arc;

/// Boundary to the completion backend. The router never interprets agent
/// failures beyond logging them.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, agent: &AgentConfig, query: &str) -> Result<AgentResponse, AgentError>;
}

/// Dispatcher that runs agents on an Ollama server
pub struct OllamaDispatcher {
    client: OllamaClient,
    tools: Option<Arc<ToolRegistry>>,
}

impl OllamaDispatcher {
    pub fn new(client: OllamaClient) -> Self {
        Self { client, tools: None }
    }

    /// Registry that agents declaring `tools` select from
    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tools = Some(registry);
        self
    }

    /// Chat completion with the agent's instructions as system message
    async fn complete(&self, agent: &AgentConfig, query: &str) -> Result<AgentResponse, AgentError> {
        let mut request = ChatRequest::new(
            agent.model.clone(),
            vec![
                Message::system(system_prompt(agent, Local::now())),
                Message::user(query),
            ],
        );
        if let Some(schema) = &agent.schema {
            request = request.with_format(schema.clone());
        }
        if let Some(temperature) = agent.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self
            .client
            .chat(&request)
            .await
            .map_err(|e| agent_error(agent, e))?;

        let mut result = AgentResponse::text(agent, response.message.content);
        if response.eval_count > 0 {
            result.eval_count = Some(response.eval_count);
        }
        if response.total_duration > 0 {
            result.total_duration_ms = Some(response.total_duration / 1_000_000);
        }

        if agent.schema.is_some() {
            let structured = serde_json::from_str(&result.content).map_err(|e| AgentError::MalformedOutput {
                agent: agent.name.clone(),
                reason: format!("response is not valid JSON: {e}"),
            })?;
            result.structured = Some(structured);
        }

        Ok(result)
    }

    /// Let the agent's model pick one of its tools and return the tool output
    async fn run_tool(&self, agent: &AgentConfig, query: &str) -> Result<AgentResponse, AgentError> {
        let registry = self.tools.as_ref().ok_or_else(|| {
            AgentError::Configuration(format!("agent `{}` declares tools but no registry is attached", agent.name))
        })?;
        let tool_error = |source: ToolError| AgentError::Tool {
            agent: agent.name.clone(),
            source,
        };

        let tools = registry.subset(&agent.tools).map_err(tool_error)?;
        let caller = ToolCaller::new(self.client.clone(), agent.model.clone(), Arc::new(tools));
        let outcome = caller.call(query).await.map_err(tool_error)?;

        Ok(AgentResponse::text(agent, outcome.output_text()).with_structured(json!({
            "tool": outcome.call.name,
            "arguments": outcome.call.arguments,
            "output": outcome.output,
        })))
    }
}

#[async_trait]
impl Dispatcher for OllamaDispatcher {
    async fn dispatch(&self, agent: &AgentConfig, query: &str) -> Result<AgentResponse, AgentError> {
        tracing::info!(agent = %agent.name, model = %agent.model, "dispatching query");

        let result = if agent.tools.is_empty() {
            self.complete(agent, query).await
        } else {
            self.run_tool(agent, query).await
        };

        if let Err(e) = &result {
            tracing::warn!(agent = %agent.name, error = %e, "agent failed");
        }
        result
    }
}

/// System message built from the agent description and instructions
fn system_prompt(agent: &AgentConfig, now: DateTime<Local>) -> String {
    let mut prompt = format!("You are {}.", agent.name);
    if let Some(description) = &agent.description {
        prompt.push(' ');
        prompt.push_str(description);
    }

    if !agent.instructions.is_empty() {
        prompt.push_str("\n\nInstructions:\n");
        for instruction in &agent.instructions {
            prompt.push_str(&format!("- {}\n", instruction));
        }
    }

    if agent.markdown {
        prompt.push_str("\nUse markdown to format your answers.");
    }
    if agent.add_datetime {
        prompt.push_str(&format!("\nThe current time is {}.", now.to_rfc3339()));
    }

    prompt
}

fn agent_error(agent: &AgentConfig, err: ollama::Error) -> AgentError {
    let name = agent.name.clone();
    if err.is_timeout() {
        return AgentError::Timeout { agent: name };
    }
    match err {
        ollama::Error::Status { status, body } => AgentError::Status {
            agent: name,
            status,
            body,
        },
        ollama::Error::Decode { source, .. } => AgentError::MalformedOutput {
            agent: name,
            reason: source.to_string(),
        },
        ollama::Error::Transport(e) => AgentError::Transport {
            agent: name,
            reason: e.to_string(),
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent `{agent}` timed out")]
    Timeout { agent: String },

    #[error("Network error calling `{agent}`: {reason}")]
    Transport { agent: String, reason: String },

    #[error("Agent `{agent}` returned status {status}: {body}")]
    Status { agent: String, status: u16, body: String },

    #[error("Malformed output from `{agent}`: {reason}")]
    MalformedOutput { agent: String, reason: String },

    #[error("Agent `{agent}` tool call failed: {source}")]
    Tool {
        agent: String,
        #[source]
        source: ToolError,
    },

    #[error("Agent configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::testing::closed_port_url;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen2.5:3b",
            "message": {"role": "assistant", "content": content},
            "done": true,
            "eval_count": 12,
            "total_duration": 3_000_000_000u64
        }))
    }

    #[test]
    fn test_system_prompt() {
        let agent = AgentConfig::new("Software Engineer", "qwen2.5-coder:3b")
            .with_description("Technical implementation specialist")
            .with_instruction("Include error handling")
            .with_instruction("Provide complexity analysis")
            .with_datetime();
        let now = Local::now();
        let prompt = system_prompt(&agent, now);

        assert!(prompt.starts_with("You are Software Engineer. Technical implementation specialist"));
        assert!(prompt.contains("- Include error handling\n- Provide complexity analysis\n"));
        assert!(prompt.contains("markdown"));
        assert!(prompt.contains(&now.to_rfc3339()));

        let mut plain = AgentConfig::new("Assistant", "qwen2.5:3b");
        plain.markdown = false;
        assert_eq!(system_prompt(&plain, now), "You are Assistant.");
    }

    #[tokio::test]
    async fn test_dispatch_plain_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "qwen2.5:3b", "stream": false})))
            .respond_with(chat_reply("Entanglement links two particles."))
            .mount(&server)
            .await;

        let dispatcher = OllamaDispatcher::new(OllamaClient::with_base_url(server.uri()));
        let agent = AgentConfig::new("Assistant", "qwen2.5:3b");
        let response = dispatcher.dispatch(&agent, "Explain entanglement").await.unwrap();

        assert_eq!(response.agent, "Assistant");
        assert_eq!(response.model, "qwen2.5:3b");
        assert_eq!(response.content, "Entanglement links two particles.");
        assert_eq!(response.eval_count, Some(12));
        assert_eq!(response.total_duration_ms, Some(3000));
        assert!(response.structured.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_with_schema() {
        let schema = json!({
            "type": "object",
            "properties": {"sub_queries": {"type": "array"}},
            "required": ["sub_queries"]
        });
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"format": schema.clone(), "options": {"temperature": 0.0}})))
            .respond_with(chat_reply(r#"{"sub_queries": ["what is an LLM"]}"#))
            .mount(&server)
            .await;

        let dispatcher = OllamaDispatcher::new(OllamaClient::with_base_url(server.uri()));
        let mut agent = AgentConfig::new("Planner", "qwen2.5:3b").with_schema(schema);
        agent.temperature = Some(0.0);
        let response = dispatcher.dispatch(&agent, "What are LLMs?").await.unwrap();

        assert_eq!(response.structured.unwrap()["sub_queries"][0], json!("what is an LLM"));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_malformed_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(chat_reply("sure, here you go"))
            .mount(&server)
            .await;

        let dispatcher = OllamaDispatcher::new(OllamaClient::with_base_url(server.uri()));
        let agent = AgentConfig::new("Planner", "qwen2.5:3b").with_schema(json!({"type": "object"}));
        let err = dispatcher.dispatch(&agent, "q").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::MalformedOutput { ref agent, ref reason }
                if agent == "Planner" && reason.starts_with("response is not valid JSON")
        ));
    }

    #[tokio::test]
    async fn test_status_and_timeout_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "missing"})))
            .respond_with(ResponseTemplate::new(404).set_body_string("model 'missing' not found"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "slow"})))
            .respond_with(chat_reply("late").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = OllamaClient::with_timeout(server.uri(), Duration::from_millis(50)).unwrap();
        let dispatcher = OllamaDispatcher::new(client);

        let err = dispatcher
            .dispatch(&AgentConfig::new("Ghost", "missing"), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Status { status: 404, .. }));

        let err = dispatcher
            .dispatch(&AgentConfig::new("Sloth", "slow"), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout { ref agent } if agent == "Sloth"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let dispatcher = OllamaDispatcher::new(OllamaClient::with_base_url(closed_port_url()));
        let err = dispatcher
            .dispatch(&AgentConfig::new("Assistant", "qwen2.5:3b"), "q")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Transport { ref agent, .. } if agent == "Assistant"));
        assert!(err.to_string().contains("`Assistant`"));
    }

    #[tokio::test]
    async fn test_tool_agent_runs_selected_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "qwen2.5:3b", "format": "json"})))
            .respond_with(chat_reply(r#"{"name": "add", "arguments": {"x": 15, "y": 27}}"#))
            .mount(&server)
            .await;

        let dispatcher = OllamaDispatcher::new(OllamaClient::with_base_url(server.uri()))
            .with_tools(Arc::new(ToolRegistry::arithmetic().unwrap()));
        let agent = AgentConfig::new("Engineer", "qwen2.5:3b").with_tools(["add", "multiply"]);
        let response = dispatcher.dispatch(&agent, "add 15 and 27").await.unwrap();

        assert_eq!(response.content, "42");
        let structured = response.structured.unwrap();
        assert_eq!(structured["tool"], json!("add"));
        assert_eq!(structured["arguments"]["x"], json!(15));
    }

    #[tokio::test]
    async fn test_tool_agent_configuration_errors() {
        let dispatcher = OllamaDispatcher::new(OllamaClient::new());
        let agent = AgentConfig::new("Engineer", "qwen2.5:3b").with_tools(["add"]);
        let err = dispatcher.dispatch(&agent, "q").await.unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));

        let dispatcher = dispatcher.with_tools(Arc::new(ToolRegistry::arithmetic().unwrap()));
        let agent = AgentConfig::new("Searcher", "qwen2.5:3b").with_tools(["search"]);
        let err = dispatcher.dispatch(&agent, "q").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Tool { source: ToolError::NotFound(ref name), .. } if name == "search"
        ));
    }
}
