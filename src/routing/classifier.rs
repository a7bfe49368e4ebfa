// Classifier - feed-forward scoring of an embedding into a query category
//
// Weights are trained elsewhere and loaded once at startup. Inference is a
// pure function of the embedding and the loaded weights.

use super::embedder::{DEFAULT_DIMENSION, Embedder};
use super::types::Category;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Linear,
    Softmax,
}

impl Activation {
    fn apply(self, z: &mut Array1<f32>) {
        match self {
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Tanh => z.mapv_inplace(f32::tanh),
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Linear => {}
            Activation::Softmax => {
                let max = z.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
                z.mapv_inplace(|v| (v - max).exp());
                let sum = z.sum();
                z.mapv_inplace(|v| v / sum);
            }
        }
    }
}

/// A hidden dense layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
    /// Dropout rate applied after this layer during training. Identity at inference.
    pub dropout: f32,
}

impl LayerSpec {
    pub fn dense(units: usize, activation: Activation) -> Self {
        Self {
            units,
            activation,
            dropout: 0.0,
        }
    }

    pub fn with_dropout(mut self, rate: f32) -> Self {
        self.dropout = rate;
        self
    }
}

/// Shape of the network the weight artifact must match. The output layer
/// has one unit per label, so only its activation is declared here.
#[derive(Debug, Clone, PartialEq)]
pub struct Architecture {
    pub input_dim: usize,
    pub hidden: Vec<LayerSpec>,
    pub output_activation: Activation,
}

impl Architecture {
    /// 384 → 256 relu (dropout 0.3) → 128 relu → 64 relu → softmax
    pub fn reference() -> Self {
        Self {
            input_dim: DEFAULT_DIMENSION,
            hidden: vec![
                LayerSpec::dense(256, Activation::Relu).with_dropout(0.3),
                LayerSpec::dense(128, Activation::Relu),
                LayerSpec::dense(64, Activation::Relu),
            ],
            output_activation: Activation::Softmax,
        }
    }

    /// Relu hidden layers of the given widths with a softmax output
    pub fn feed_forward(input_dim: usize, hidden_units: &[usize]) -> Self {
        Self {
            input_dim,
            hidden: hidden_units
                .iter()
                .map(|&units| LayerSpec::dense(units, Activation::Relu))
                .collect(),
            output_activation: Activation::Softmax,
        }
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        if self.input_dim == 0 {
            return Err(ModelLoadError::Architecture("input dimension is zero".to_string()));
        }
        for (i, layer) in self.hidden.iter().enumerate() {
            if layer.units == 0 {
                return Err(ModelLoadError::Architecture(format!("hidden layer {i} has no units")));
            }
            if !(0.0..1.0).contains(&layer.dropout) {
                return Err(ModelLoadError::Architecture(format!(
                    "hidden layer {i} dropout {} outside [0, 1)",
                    layer.dropout
                )));
            }
        }
        Ok(())
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::reference()
    }
}

/// Serialized network weights.
///
/// Kernels are stored input-major (`kernel[input][unit]`), one entry per
/// dense layer including the output layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightArtifact {
    /// Category of each output unit, in order
    #[serde(default = "default_labels")]
    pub labels: Vec<Category>,
    pub layers: Vec<DenseWeights>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseWeights {
    pub kernel: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

fn default_labels() -> Vec<Category> {
    vec![Category::Code, Category::Reason, Category::Language]
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

/// Loaded query classifier. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Classifier {
    input_dim: usize,
    layers: Vec<DenseLayer>,
    labels: Vec<Category>,
}

impl Classifier {
    /// Load and validate a weight artifact from disk
    pub fn load(path: impl AsRef<Path>, architecture: &Architecture) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: WeightArtifact = serde_json::from_str(&contents)?;
        let classifier = Self::from_artifact(artifact, architecture)?;

        tracing::info!(
            path = %path.display(),
            layers = classifier.layers.len(),
            labels = ?classifier.labels,
            "loaded classifier weights"
        );
        Ok(classifier)
    }

    /// Validate an in-memory artifact against the architecture
    pub fn from_artifact(artifact: WeightArtifact, architecture: &Architecture) -> Result<Self, ModelLoadError> {
        architecture.validate()?;
        validate_labels(&artifact.labels)?;

        let expected_layers = architecture.hidden.len() + 1;
        if artifact.layers.len() != expected_layers {
            return Err(ModelLoadError::LayerCount {
                expected: expected_layers,
                actual: artifact.layers.len(),
            });
        }

        let output_units = artifact.labels.len();
        if let Some(last) = artifact.layers.last() {
            if last.bias.len() != output_units {
                return Err(ModelLoadError::LabelCount {
                    units: last.bias.len(),
                    labels: output_units,
                });
            }
        }

        let shapes = architecture
            .hidden
            .iter()
            .map(|spec| (spec.units, spec.activation))
            .chain(std::iter::once((output_units, architecture.output_activation)));

        let mut layers = Vec::with_capacity(expected_layers);
        let mut fan_in = architecture.input_dim;
        for (index, (weights, (units, activation))) in artifact.layers.into_iter().zip(shapes).enumerate() {
            layers.push(build_layer(index, weights, fan_in, units, activation)?);
            fan_in = units;
        }

        Ok(Self {
            input_dim: architecture.input_dim,
            layers,
            labels: artifact.labels,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Categories this classifier can produce, in output-unit order
    pub fn labels(&self) -> &[Category] {
        &self.labels
    }

    /// Run the network and return one score per label
    pub fn scores(&self, embedding: &[f32]) -> Result<Vec<f32>, ClassifyError> {
        if embedding.len() != self.input_dim {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.input_dim,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::NonFiniteInput);
        }

        let mut x = Array1::from(embedding.to_vec());
        for layer in &self.layers {
            let mut z = x.dot(&layer.kernel) + &layer.bias;
            layer.activation.apply(&mut z);
            x = z;
        }

        if x.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::NonFiniteScore);
        }
        Ok(x.to_vec())
    }

    /// Pick the highest-scoring category.
    ///
    /// Exact ties resolve to the label with the lowest index. Any failure
    /// (wrong dimension, non-finite values) yields `Category::Unknown`.
    pub fn classify(&self, embedding: &[f32]) -> Category {
        match self.scores(embedding) {
            Ok(scores) => match argmax(&scores) {
                Some(index) => self.labels[index],
                None => Category::Unknown,
            },
            Err(e) => {
                tracing::warn!(error = %e, "classification failed");
                Category::Unknown
            }
        }
    }

    /// Embed `text` and classify it. Embedding failures yield `Category::Unknown`.
    pub async fn predict(&self, embedder: &dyn Embedder, text: &str) -> Category {
        match embedder.embed(text).await {
            Ok(embedding) => self.classify(&embedding),
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed");
                Category::Unknown
            }
        }
    }
}

/// Index of the first maximum
fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

fn validate_labels(labels: &[Category]) -> Result<(), ModelLoadError> {
    if labels.is_empty() {
        return Err(ModelLoadError::Labels("no labels declared".to_string()));
    }
    if labels.contains(&Category::Unknown) {
        return Err(ModelLoadError::Labels("`unknown` cannot be a trained label".to_string()));
    }
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(ModelLoadError::Labels(format!("duplicate label `{label}`")));
        }
    }
    Ok(())
}

fn build_layer(
    index: usize,
    weights: DenseWeights,
    fan_in: usize,
    units: usize,
    activation: Activation,
) -> Result<DenseLayer, ModelLoadError> {
    let rows = weights.kernel.len();
    let ragged = weights.kernel.iter().find(|row| row.len() != units);
    if rows != fan_in || ragged.is_some() {
        let cols = ragged.map_or(units, Vec::len);
        return Err(ModelLoadError::Shape {
            layer: index,
            what: "kernel",
            expected: (fan_in, units),
            actual: (rows, cols),
        });
    }
    if weights.bias.len() != units {
        return Err(ModelLoadError::Shape {
            layer: index,
            what: "bias",
            expected: (1, units),
            actual: (1, weights.bias.len()),
        });
    }

    let flat: Vec<f32> = weights.kernel.into_iter().flatten().collect();
    if flat.iter().chain(weights.bias.iter()).any(|v| !v.is_finite()) {
        return Err(ModelLoadError::NonFinite { layer: index });
    }

    let kernel = Array2::from_shape_vec((fan_in, units), flat).map_err(|_| ModelLoadError::Shape {
        layer: index,
        what: "kernel",
        expected: (fan_in, units),
        actual: (rows, units),
    })?;

    Ok(DenseLayer {
        kernel,
        bias: Array1::from(weights.bias),
        activation,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Failed to read weights from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse weight artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid architecture: {0}")]
    Architecture(String),

    #[error("Architecture has {expected} dense layers, artifact has {actual}")]
    LayerCount { expected: usize, actual: usize },

    #[error("Layer {layer}: {what} has shape {actual:?}, expected {expected:?}")]
    Shape {
        layer: usize,
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Layer {layer} contains a non-finite weight")]
    NonFinite { layer: usize },

    #[error("Output layer has {units} units but {labels} labels are declared")]
    LabelCount { units: usize, labels: usize },

    #[error("Invalid labels: {0}")]
    Labels(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Embedding has dimension {actual}, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding contains non-finite values")]
    NonFiniteInput,

    #[error("Network produced non-finite scores")]
    NonFiniteScore,
}
