//! Feature Extractor
//!
//! Per-window pipeline: 1D ResNet backbone → LSTM over the remaining time
//! steps → 1x1 convolution projection with leaky ReLU. The series-level
//! embedding is the mean of the per-window features over a random subset of
//! windows (see [`WindowSampler`]), flattened to `[batch, fc_dim]`.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        lstm::{Lstm, LstmConfig, LstmState},
        LeakyRelu, LeakyReluConfig,
    },
    tensor::{backend::Backend, Tensor, TensorData},
};
use rand::{distributions::Uniform, prelude::Distribution, Rng};
use tracing::{debug, info};

use super::backbone::Backbone;
use super::config::{
    check_fc_layers, BackboneKind, CellInit, ResNetDepth, TemporalKind, PROJECTION_CHANNELS,
};
use super::window::WindowSampler;
use crate::utils::error::{DannError, Result as DannResult};

/// Configuration for the [`FeatureExtractor`]
#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    /// Window length in samples
    pub time_len: usize,

    /// Number of input channels per sample
    pub sequence_num: usize,

    /// Output dimension of the regression head fed by this extractor
    pub output_dim: usize,

    /// Convolutional backbone
    #[config(default = "BackboneKind::ResNet(ResNetDepth::D18)")]
    pub backbone: BackboneKind,

    /// Temporal aggregator
    #[config(default = "TemporalKind::Lstm")]
    pub temporal: TemporalKind,

    /// Fully connected depth of the heads built on top of this extractor
    #[config(default = "3")]
    pub fc_layers: usize,

    /// Whether the model is meant to live on a GPU device
    #[config(default = "false")]
    pub use_gpu: bool,

    /// Whether the heads use dropout
    #[config(default = "false")]
    pub dropout: bool,

    /// Cell-state seeding when the recurrent state is reset
    #[config(default = "CellInit::Independent")]
    pub cell_init: CellInit,
}

impl FeatureExtractorConfig {
    /// Check sizes before any weights are allocated
    pub fn validate(&self) -> DannResult<()> {
        if self.time_len == 0 {
            return Err(DannError::Config("time_len must be greater than 0".to_string()));
        }
        if self.sequence_num == 0 {
            return Err(DannError::Config("sequence_num must be greater than 0".to_string()));
        }
        if self.output_dim == 0 {
            return Err(DannError::Config("output_dim must be greater than 0".to_string()));
        }
        check_fc_layers(self.fc_layers)
    }

    /// Embedding width for this configuration
    pub fn fc_dim(&self) -> usize {
        PROJECTION_CHANNELS * self.backbone.output_len(self.time_len)
    }

    /// Build the extractor on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> DannResult<FeatureExtractor<B>> {
        self.validate()?;

        let backbone = Backbone::new(self.backbone, self.sequence_num, device);
        let hidden_dim = backbone.out_channels();
        let temporal = TemporalNet::new(self.temporal, hidden_dim, device);
        let projection = Conv1dConfig::new(hidden_dim, PROJECTION_CHANNELS, 1)
            .with_bias(true)
            .init(device);
        let fc_dim = self.fc_dim();

        info!(
            "FeatureExtractor: backbone={} temporal={} channels={} window={} fc_dim={} gpu={}",
            self.backbone, self.temporal, self.sequence_num, self.time_len, fc_dim, self.use_gpu
        );

        Ok(FeatureExtractor {
            backbone,
            temporal,
            projection,
            activation: LeakyReluConfig::new().init(),
            time_len: self.time_len,
            sequence_num: self.sequence_num,
            output_dim: self.output_dim,
            fc_layers: self.fc_layers,
            hidden_dim,
            fc_dim,
            use_gpu: self.use_gpu,
            dropout: self.dropout,
            mirror_cell: self.cell_init == CellInit::MirrorHidden,
        })
    }
}

/// Initial recurrent state, `[layers, batch, hidden_dim]` each
///
/// Only built by [`FeatureExtractor::init_hidden`], which rejects empty sizes.
#[derive(Debug, Clone)]
pub struct RecurrentState<B: Backend> {
    hidden: Tensor<B, 3>,
    cell: Tensor<B, 3>,
}

impl<B: Backend> RecurrentState<B> {
    pub fn hidden(&self) -> &Tensor<B, 3> {
        &self.hidden
    }

    pub fn cell(&self) -> &Tensor<B, 3> {
        &self.cell
    }

    /// State of the last layer in the `[batch, hidden_dim]` layout the LSTM expects
    pub fn into_lstm_state(self) -> LstmState<B, 2> {
        let [layers, batch, hidden_dim] = self.hidden.dims();
        let last = |t: Tensor<B, 3>| t.narrow(0, layers - 1, 1).reshape([batch, hidden_dim]);

        LstmState::new(last(self.cell), last(self.hidden))
    }
}

/// Temporal aggregator selected by [`TemporalKind`]
#[derive(Module, Debug)]
pub enum TemporalNet<B: Backend> {
    Lstm(Lstm<B>),
}

impl<B: Backend> TemporalNet<B> {
    pub fn new(kind: TemporalKind, hidden_dim: usize, device: &B::Device) -> Self {
        match kind {
            TemporalKind::Lstm => {
                TemporalNet::Lstm(LstmConfig::new(hidden_dim, hidden_dim, true).init(device))
            }
        }
    }

    /// `[batch, steps, hidden]` -> `[batch, steps, hidden]`; `None` starts from zeros
    pub fn forward(&self, x: Tensor<B, 3>, state: Option<RecurrentState<B>>) -> Tensor<B, 3> {
        match self {
            TemporalNet::Lstm(lstm) => {
                let (output, _) = lstm.forward(x, state.map(RecurrentState::into_lstm_state));
                output
            }
        }
    }
}

/// Convolutional + recurrent feature extractor
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    backbone: Backbone<B>,
    temporal: TemporalNet<B>,
    projection: Conv1d<B>,
    activation: LeakyRelu,
    time_len: usize,
    sequence_num: usize,
    output_dim: usize,
    fc_layers: usize,
    hidden_dim: usize,
    fc_dim: usize,
    use_gpu: bool,
    dropout: bool,
    mirror_cell: bool,
}

impl<B: Backend> FeatureExtractor<B> {
    /// Embed a full series: `[batch, sequence_num, k * time_len]` -> `[batch, fc_dim]`
    ///
    /// Evaluates a random, non-empty subset of the `k` windows and averages
    /// their features. Output depends on `rng`; a seeded generator makes it
    /// reproducible.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        series: Tensor<B, 3>,
        reset: bool,
        rng: &mut R,
    ) -> DannResult<Tensor<B, 2>> {
        let dims = series.dims();
        self.check_channels("forward", dims)?;

        let plan = WindowSampler::new(self.time_len)
            .plan(dims[2], rng)
            .map_err(|_| {
                DannError::shape(
                    "forward",
                    dims,
                    format!("a series length divisible by {}", self.time_len),
                )
            })?;
        debug!(
            "sampled {}/{} windows: {:?}",
            plan.len(),
            plan.num_windows,
            plan.selected
        );

        let mut features = Vec::with_capacity(plan.len());
        for &index in &plan.selected {
            let range = plan.range(index, self.time_len);
            let window = series.clone().narrow(2, range.start, range.len());
            features.push(self.get_feature(window, reset, rng)?);
        }

        self.aggregate(features)
    }

    /// Average precomputed per-window features and flatten to `[batch, channels * steps]`
    pub fn aggregate(&self, features: Vec<Tensor<B, 3>>) -> DannResult<Tensor<B, 2>> {
        let first = features
            .first()
            .map(|f| f.dims())
            .ok_or_else(|| DannError::Config("no window features to aggregate".to_string()))?;
        if let Some(bad) = features.iter().find(|f| f.dims() != first) {
            return Err(DannError::shape("aggregate", bad.dims(), format!("{:?}", first)));
        }

        let [batch, channels, steps] = first;
        let stacked: Tensor<B, 4> = Tensor::stack(features, 1);

        Ok(stacked.mean_dim(1).reshape([batch, channels * steps]))
    }

    /// Features of one window: `[batch, sequence_num, time_len]` -> `[batch, 512, steps]`
    pub fn get_feature<R: Rng + ?Sized>(
        &self,
        window: Tensor<B, 3>,
        reset: bool,
        rng: &mut R,
    ) -> DannResult<Tensor<B, 3>> {
        let dims = window.dims();
        self.check_channels("get_feature", dims)?;
        if dims[2] != self.time_len {
            return Err(DannError::shape(
                "get_feature",
                dims,
                format!("a window of length {}", self.time_len),
            ));
        }
        let device = window.device();

        let x = self.backbone.forward(window);
        // [batch, channels, steps] -> [batch, steps, channels]
        let x = x.swap_dims(1, 2);
        let state = if reset {
            Some(self.init_hidden(self.hidden_dim, dims[0], 1, rng, &device)?)
        } else {
            None
        };
        let x = self.temporal.forward(x, state);
        let x = x.swap_dims(1, 2);

        Ok(self.activation.forward(self.projection.forward(x)))
    }

    /// [`get_feature`](Self::get_feature) for single-channel windows given as `[batch, time_len]`
    pub fn get_feature_single_channel<R: Rng + ?Sized>(
        &self,
        window: Tensor<B, 2>,
        reset: bool,
        rng: &mut R,
    ) -> DannResult<Tensor<B, 3>> {
        self.get_feature(window.unsqueeze_dim(1), reset, rng)
    }

    /// Xavier-uniform trainable initial state of shape `[layers, batch, hidden_dim]`
    pub fn init_hidden<R: Rng + ?Sized>(
        &self,
        hidden_dim: usize,
        batch: usize,
        layers: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> DannResult<RecurrentState<B>> {
        let shape = [layers, batch, hidden_dim];
        if shape.contains(&0) {
            return Err(DannError::Config(format!(
                "recurrent state sizes must be positive, got [layers={}, batch={}, hidden_dim={}]",
                layers, batch, hidden_dim
            )));
        }
        let hidden = xavier_uniform::<B, R>(shape, rng, device);
        let cell = if self.mirror_cell {
            hidden.clone()
        } else {
            xavier_uniform::<B, R>(shape, rng, device)
        };

        Ok(RecurrentState {
            hidden: hidden.require_grad(),
            cell: cell.require_grad(),
        })
    }

    fn check_channels(&self, context: &str, dims: [usize; 3]) -> DannResult<()> {
        if dims[1] != self.sequence_num {
            return Err(DannError::shape(
                context,
                dims,
                format!("{} sequence channels", self.sequence_num),
            ));
        }
        Ok(())
    }

    /// Embedding width, fixed at construction
    pub fn fc_dim(&self) -> usize {
        self.fc_dim
    }

    pub fn time_len(&self) -> usize {
        self.time_len
    }

    pub fn sequence_num(&self) -> usize {
        self.sequence_num
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn fc_layers(&self) -> usize {
        self.fc_layers
    }

    /// Width of the backbone output and of the LSTM state
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    pub fn dropout(&self) -> bool {
        self.dropout
    }

    pub fn cell_init(&self) -> CellInit {
        if self.mirror_cell {
            CellInit::MirrorHidden
        } else {
            CellInit::Independent
        }
    }
}

/// Uniform draw in `±sqrt(6 / (fan_in + fan_out))` using PyTorch's fan rule for rank-3 tensors
fn xavier_uniform<B: Backend, R: Rng + ?Sized>(
    shape: [usize; 3],
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 3> {
    let bound = xavier_bound(shape);
    let dist = Uniform::new_inclusive(-bound, bound);
    let values: Vec<f32> = (0..shape.iter().product::<usize>())
        .map(|_| dist.sample(rng))
        .collect();

    Tensor::from_data(TensorData::new(values, shape), device)
}

fn xavier_bound(shape: [usize; 3]) -> f32 {
    let [layers, batch, hidden_dim] = shape;
    let fan_in = batch * hidden_dim;
    let fan_out = layers * hidden_dim;
    (6.0 / (fan_in + fan_out) as f64).sqrt() as f32
}
