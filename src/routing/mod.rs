// Routing system - classify queries and dispatch them to specialized agents

pub mod clarify;
pub mod classifier;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod embedder;
pub mod router;
pub mod tools;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use clarify::{ClarificationSet, MultipleChoiceQuestion, clarifier_agent, clarify};
pub use classifier::{Activation, Architecture, Classifier, ClassifyError, LayerSpec, ModelLoadError, WeightArtifact};
pub use config::{ConfigError, RouterConfig};
pub use context::{InitError, RouterContext};
pub use dispatcher::{AgentError, Dispatcher, OllamaDispatcher};
pub use embedder::{Embedder, EmbeddingError, OllamaEmbedder};
pub use router::{RouteTable, RoutingError};
pub use tools::{ToolCall, ToolCaller, ToolError, ToolRegistry, ToolSpec};
pub use types::*;
