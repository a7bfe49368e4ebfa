//! Query classification and model routing
//!
//! A query is embedded, scored by a small feed-forward classifier, mapped
//! to a category and handed to the agent that the route table assigns to
//! that category. Tools selected by an LLM through a JSON object are
//! resolved against a statically declared registry.

pub mod routing;

pub use routing::{
    AgentConfig, AgentResponse, Category, Classifier, Dispatcher, Embedder, QueryOutcome,
    RouteTable, RouterConfig, RouterContext,
};
