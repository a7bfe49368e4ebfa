// Test doubles shared by the routing tests

use super::classifier::{Architecture, DenseWeights, WeightArtifact};
use super::dispatcher::{AgentError, Dispatcher};
use super::embedder::{Embedder, EmbeddingError};
use super::types::{AgentConfig, AgentResponse, Category};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Unit vector along `axis`
pub fn basis(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

/// Weights that copy the leading input components through every layer,
/// so the output logits equal the first `labels.len()` inputs.
pub fn pass_through_artifact(architecture: &Architecture, labels: &[Category]) -> WeightArtifact {
    let widths = architecture
        .hidden
        .iter()
        .map(|l| l.units)
        .chain(std::iter::once(labels.len()));

    let mut fan_in = architecture.input_dim;
    let mut layers = Vec::new();
    for units in widths {
        let mut kernel = vec![vec![0.0; units]; fan_in];
        for (i, row) in kernel.iter_mut().enumerate().take(units) {
            row[i] = 1.0;
        }
        layers.push(DenseWeights {
            kernel,
            bias: vec![0.0; units],
        });
        fan_in = units;
    }

    WeightArtifact {
        labels: labels.to_vec(),
        layers,
    }
}

pub fn write_artifact(dir: &Path, artifact: &WeightArtifact) -> PathBuf {
    let path = dir.join("weights.json");
    std::fs::write(&path, serde_json::to_string(artifact).unwrap()).unwrap();
    path
}

/// Base URL of a local port with nothing listening on it
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Embedder with a fixed table of texts; anything else is a backend failure
pub struct StubEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, embedding: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), embedding);
        self
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::Backend(format!("no embedding for {text:?}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Dispatcher that echoes the query and records which models were called
#[derive(Default)]
pub struct RecordingDispatcher {
    pub calls: Mutex<Vec<String>>,
    pub fail_models: Vec<String>,
}

impl RecordingDispatcher {
    pub fn failing_for(model: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_models: vec![model.to_string()],
        }
    }

    pub fn models(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, agent: &AgentConfig, query: &str) -> Result<AgentResponse, AgentError> {
        self.calls.lock().unwrap().push(agent.model.clone());
        if self.fail_models.contains(&agent.model) {
            return Err(AgentError::Timeout {
                agent: agent.name.clone(),
            });
        }
        Ok(AgentResponse::text(agent, format!("{} answered: {query}", agent.name)))
    }
}
