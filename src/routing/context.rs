// RouterContext - everything a request handler needs, loaded once at startup

use super::classifier::{Classifier, ModelLoadError};
use super::config::{ConfigError, RouterConfig};
use super::dispatcher::{Dispatcher, OllamaDispatcher};
use super::embedder::{Embedder, OllamaEmbedder};
use super::router::{RouteTable, RoutingError};
use super::tools::{ToolError, ToolRegistry};
use super::types::{AgentConfig, Category, QueryOutcome};
use ollama::OllamaClient;
use std::sync::Arc;

/// Loaded classifier, route table, embedder and dispatcher.
///
/// Read-only after construction; share it behind an `Arc` between any
/// number of concurrent request handlers.
pub struct RouterContext {
    classifier: Classifier,
    routes: RouteTable,
    embedder: Arc<dyn Embedder>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl RouterContext {
    /// Assemble a context, checking that the pieces fit together
    pub fn new(
        classifier: Classifier,
        routes: RouteTable,
        embedder: Arc<dyn Embedder>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, InitError> {
        if embedder.dimension() != classifier.input_dim() {
            return Err(InitError::Dimension {
                embedder: embedder.dimension(),
                classifier: classifier.input_dim(),
            });
        }
        routes.ensure_covers(classifier.labels())?;

        Ok(Self {
            classifier,
            routes,
            embedder,
            dispatcher,
        })
    }

    /// Build the Ollama-backed context described by `config`
    pub fn from_config(config: &RouterConfig) -> Result<Self, InitError> {
        let classifier = Classifier::load(&config.classifier.weights, &config.architecture())?;
        let routes = config.route_table()?;

        let client = OllamaClient::with_timeout(&config.ollama.host, config.timeout())
            .map_err(|e| InitError::Client(e.to_string()))?;
        let embedder = OllamaEmbedder::new(client.clone(), &config.embedder.model, config.embedder.dimension);
        let dispatcher = OllamaDispatcher::new(client).with_tools(Arc::new(ToolRegistry::arithmetic()?));

        tracing::info!(
            host = %config.ollama.host,
            embed_model = %config.embedder.model,
            "router context ready"
        );
        Self::new(classifier, routes, Arc::new(embedder), Arc::new(dispatcher))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Category of a query; `Unknown` when it cannot be embedded or scored
    pub async fn classify(&self, query: &str) -> Category {
        self.classifier.predict(self.embedder.as_ref(), query).await
    }

    pub fn route(&self, category: Category) -> Result<&AgentConfig, RoutingError> {
        self.routes.route(category)
    }

    /// Classify, route and dispatch one query. Never fails: errors are
    /// reported in the returned outcome.
    pub async fn process(&self, query: &str) -> QueryOutcome {
        let category = self.classify(query).await;

        let agent = match self.route(category) {
            Ok(agent) => agent,
            Err(e) => {
                tracing::error!(%category, error = %e, "route table is incomplete");
                return QueryOutcome::failed(query, category, None, e.to_string());
            }
        };

        tracing::info!(%category, agent = %agent.name, "routing query");
        match self.dispatcher.dispatch(agent, query).await {
            Ok(response) => QueryOutcome::success(query, category, response),
            Err(e) => QueryOutcome::failed(query, category, Some(agent.name.clone()), e.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Tools(#[from] ToolError),

    #[error("Embedder produces {embedder}-dimensional vectors but the classifier expects {classifier}")]
    Dimension { embedder: usize, classifier: usize },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}
