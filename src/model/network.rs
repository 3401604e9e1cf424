//! Domain-adversarial network
//!
//! Wires the feature extractor to both heads: the regression head sees the
//! embedding directly, the domain classifier sees it through gradient reversal.

use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use super::feature::{FeatureExtractor, FeatureExtractorConfig};
use super::heads::{Classifier, ClassifierConfig, Regressioner, RegressionerConfig};
use crate::utils::error::Result as DannResult;

/// Configuration for the full [`DannNetwork`]
#[derive(Config, Debug)]
pub struct DannNetworkConfig {
    /// Shared feature extractor; its `output_dim`, `fc_layers`, `dropout` and
    /// `use_gpu` also configure both heads
    pub extractor: FeatureExtractorConfig,

    /// Seed for the window-sampling generator returned by [`DannNetworkConfig::rng`]
    #[config(default = "42")]
    pub seed: u64,
}

impl DannNetworkConfig {
    /// Build all three components on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> DannResult<DannNetwork<B>> {
        let extractor = self.extractor.init(device)?;
        let fc_dim = extractor.fc_dim();

        let regressor = RegressionerConfig::new(fc_dim, self.extractor.output_dim)
            .with_fc_layers(self.extractor.fc_layers)
            .with_use_gpu(self.extractor.use_gpu)
            .with_dropout(self.extractor.dropout)
            .init(device)?;
        let classifier = ClassifierConfig::new(fc_dim)
            .with_fc_layers(self.extractor.fc_layers)
            .with_use_gpu(self.extractor.use_gpu)
            .with_dropout(self.extractor.dropout)
            .init(device)?;

        let network = DannNetwork {
            extractor,
            regressor,
            classifier,
        };
        info!(
            "DannNetwork: fc_dim={} output_dim={} fc_layers={} params={}",
            fc_dim,
            self.extractor.output_dim,
            self.extractor.fc_layers,
            network.num_params()
        );

        Ok(network)
    }

    /// Seeded generator for reproducible window sampling
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

/// Outputs of one pass through all branches
#[derive(Debug, Clone)]
pub struct DannOutput<B: Backend> {
    /// Shared embedding, `[batch, fc_dim]`
    pub embedding: Tensor<B, 2>,
    /// Regression prediction in `[0, 1]`, `[batch, output_dim]`
    pub prediction: Tensor<B, 2>,
    /// Per-stage outputs of the regression head
    pub activations: Vec<Tensor<B, 2>>,
    /// Domain log-probabilities, `[batch, 2]`
    pub domain_log_probs: Tensor<B, 2>,
}

/// Feature extractor with a regression head and an adversarial domain head
#[derive(Module, Debug)]
pub struct DannNetwork<B: Backend> {
    pub extractor: FeatureExtractor<B>,
    pub regressor: Regressioner<B>,
    pub classifier: Classifier<B>,
}

impl<B: Backend> DannNetwork<B> {
    /// Embed `series` once and feed both heads; `alpha` scales the reversed gradient
    pub fn forward<R: Rng + ?Sized>(
        &self,
        series: Tensor<B, 3>,
        alpha: f64,
        rng: &mut R,
    ) -> DannResult<DannOutput<B>> {
        let embedding = self.extractor.forward(series, true, rng)?;
        let regression = self.regressor.forward(embedding.clone(), None)?;
        let domain_log_probs = self.classifier.forward(embedding.clone(), alpha);

        Ok(DannOutput {
            embedding,
            prediction: regression.prediction,
            activations: regression.activations,
            domain_log_probs,
        })
    }

    pub fn fc_dim(&self) -> usize {
        self.extractor.fc_dim()
    }
}
