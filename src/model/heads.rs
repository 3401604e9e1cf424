//! Regression and domain-classification heads
//!
//! Both heads share the same width schedule `{in_dim → 512 → 256 → 256 → 128 → 128}`,
//! truncated to `fc_layers` hidden stages and closed by a linear projection.
//! Stages are described by [`StageSpec`] values built once at construction.

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, LeakyRelu, LeakyReluConfig, Linear, LinearConfig},
    tensor::{
        activation::{log_softmax, sigmoid},
        backend::Backend,
        Tensor,
    },
};
use tracing::debug;

use super::config::{check_fc_layers, FC_WIDTHS, STAGE_DROPOUT};
use super::reversal::reverse_gradient;
use crate::utils::error::{DannError, Result as DannResult};

/// Number of domains the classifier separates
pub const DOMAIN_CLASSES: usize = 2;

/// One fully connected stage: linear → optional dropout → optional leaky ReLU
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSpec {
    pub in_dim: usize,
    pub out_dim: usize,
    pub dropout: Option<f64>,
    pub leaky_relu: bool,
}

impl StageSpec {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FcStage<B> {
        FcStage {
            linear: LinearConfig::new(self.in_dim, self.out_dim).init(device),
            dropout: self.dropout.map(|p| DropoutConfig::new(p).init()),
            activation: self.leaky_relu.then(|| LeakyReluConfig::new().init()),
        }
    }
}

/// Stage descriptors for `fc_layers` hidden stages plus the output projection
pub fn stage_specs(
    in_dim: usize,
    fc_layers: usize,
    out_dim: usize,
    dropout: bool,
) -> DannResult<Vec<StageSpec>> {
    check_fc_layers(fc_layers)?;
    if in_dim == 0 || out_dim == 0 {
        return Err(DannError::Config(format!(
            "stage dimensions must be positive (in_dim={}, out_dim={})",
            in_dim, out_dim
        )));
    }

    let mut specs = Vec::with_capacity(fc_layers + 1);
    let mut width = in_dim;
    for &next in FC_WIDTHS.iter().take(fc_layers) {
        specs.push(StageSpec {
            in_dim: width,
            out_dim: next,
            dropout: dropout.then_some(STAGE_DROPOUT),
            leaky_relu: true,
        });
        width = next;
    }
    specs.push(StageSpec {
        in_dim: width,
        out_dim,
        dropout: None,
        leaky_relu: false,
    });

    Ok(specs)
}

/// A built fully connected stage
#[derive(Module, Debug)]
pub struct FcStage<B: Backend> {
    linear: Linear<B>,
    dropout: Option<Dropout>,
    activation: Option<LeakyRelu>,
}

impl<B: Backend> FcStage<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        let x = match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        };
        match &self.activation {
            Some(activation) => activation.forward(x),
            None => x,
        }
    }
}

fn build_stages<B: Backend>(specs: &[StageSpec], device: &B::Device) -> Vec<FcStage<B>> {
    specs.iter().map(|spec| spec.init(device)).collect()
}

/// Configuration for the [`Regressioner`]
#[derive(Config, Debug)]
pub struct RegressionerConfig {
    /// Embedding width
    pub in_dim: usize,

    /// Prediction width
    pub output_dim: usize,

    /// Hidden stages, 1 to 5
    #[config(default = "3")]
    pub fc_layers: usize,

    /// Whether the model is meant to live on a GPU device
    #[config(default = "false")]
    pub use_gpu: bool,

    /// Dropout(0.1) inside hidden stages
    #[config(default = "false")]
    pub dropout: bool,
}

impl RegressionerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DannResult<Regressioner<B>> {
        let specs = stage_specs(self.in_dim, self.fc_layers, self.output_dim, self.dropout)?;
        debug!(
            "Regressioner: {} stages, widths {:?}",
            specs.len(),
            specs.iter().map(|s| s.out_dim).collect::<Vec<_>>()
        );

        Ok(Regressioner {
            stages: build_stages(&specs, device),
            in_dim: self.in_dim,
            output_dim: self.output_dim,
            use_gpu: self.use_gpu,
        })
    }
}

/// Bounded prediction plus every stage output that produced it
#[derive(Debug, Clone)]
pub struct RegressionOutput<B: Backend> {
    /// Sigmoid of the last evaluated stage
    pub prediction: Tensor<B, 2>,
    /// Raw output of each evaluated stage, in order
    pub activations: Vec<Tensor<B, 2>>,
}

/// Task head: fully connected stack with sigmoid output
#[derive(Module, Debug)]
pub struct Regressioner<B: Backend> {
    stages: Vec<FcStage<B>>,
    in_dim: usize,
    output_dim: usize,
    use_gpu: bool,
}

impl<B: Backend> Regressioner<B> {
    /// Run stages `0..end_layer` (all when `None`) and bound the result with a sigmoid
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
        end_layer: Option<usize>,
    ) -> DannResult<RegressionOutput<B>> {
        let end = end_layer.unwrap_or(self.stages.len());
        if end > self.stages.len() {
            return Err(DannError::Config(format!(
                "end_layer {} exceeds the {} available stages",
                end,
                self.stages.len()
            )));
        }

        let mut activations = Vec::with_capacity(end);
        let mut x = x;
        for stage in &self.stages[..end] {
            x = stage.forward(x);
            activations.push(x.clone());
        }

        Ok(RegressionOutput {
            prediction: sigmoid(x),
            activations,
        })
    }

    /// Hidden stages plus the output projection
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }
}

/// Configuration for the [`Classifier`]
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Embedding width
    pub in_dim: usize,

    /// Hidden stages, 1 to 5
    #[config(default = "3")]
    pub fc_layers: usize,

    /// Whether the model is meant to live on a GPU device
    #[config(default = "false")]
    pub use_gpu: bool,

    /// Dropout(0.1) inside hidden stages
    #[config(default = "false")]
    pub dropout: bool,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DannResult<Classifier<B>> {
        let specs = stage_specs(self.in_dim, self.fc_layers, DOMAIN_CLASSES, self.dropout)?;

        Ok(Classifier {
            stages: build_stages(&specs, device),
            in_dim: self.in_dim,
            use_gpu: self.use_gpu,
        })
    }
}

/// Domain head: gradient reversal → fully connected stack → 2-way log-softmax
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    stages: Vec<FcStage<B>>,
    in_dim: usize,
    use_gpu: bool,
}

impl<B: Backend> Classifier<B> {
    /// Domain log-probabilities; gradients flowing back into `x` are scaled by `-alpha`
    pub fn forward(&self, x: Tensor<B, 2>, alpha: f64) -> Tensor<B, 2> {
        self.discriminate(reverse_gradient(x, alpha))
    }

    /// Domain log-probabilities without gradient reversal
    pub fn discriminate(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let logits = self.stages.iter().fold(x, |x, stage| stage.forward(x));
        log_softmax(logits, 1)
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_stage_schedule_truncation() {
        let specs = stage_specs(1024, 3, 7, true).unwrap();
        let dims: Vec<(usize, usize)> = specs.iter().map(|s| (s.in_dim, s.out_dim)).collect();
        assert_eq!(dims, vec![(1024, 512), (512, 256), (256, 256), (256, 7)]);

        assert!(specs[..3].iter().all(|s| s.leaky_relu && s.dropout == Some(0.1)));
        assert!(!specs[3].leaky_relu);
        assert_eq!(specs[3].dropout, None);
    }

    #[test]
    fn test_stage_schedule_full_depth() {
        let specs = stage_specs(64, 5, 1, false).unwrap();
        let widths: Vec<usize> = specs.iter().map(|s| s.out_dim).collect();
        assert_eq!(widths, vec![512, 256, 256, 128, 128, 1]);
        assert!(specs.iter().all(|s| s.dropout.is_none()));
    }

    #[test]
    fn test_fc_layers_out_of_range() {
        let device = Default::default();
        for bad in [0, 6, 10] {
            assert!(matches!(
                RegressionerConfig::new(32, 1).with_fc_layers(bad).init::<TestBackend>(&device),
                Err(DannError::InvalidFcLayers(_))
            ));
            assert!(matches!(
                ClassifierConfig::new(32).with_fc_layers(bad).init::<TestBackend>(&device),
                Err(DannError::InvalidFcLayers(_))
            ));
        }
    }

    #[test]
    fn test_head_configs_round_trip_through_json() {
        let regressioner = RegressionerConfig::new(512, 2).with_fc_layers(4).with_dropout(true);
        let json = serde_json::to_string(&regressioner).unwrap();
        let parsed: RegressionerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.fc_layers, 4);
        assert!(parsed.dropout);

        let classifier = ClassifierConfig::new(256).with_use_gpu(true);
        let parsed: ClassifierConfig =
            serde_json::from_str(&serde_json::to_string(&classifier).unwrap()).unwrap();
        assert_eq!(parsed.in_dim, 256);
        assert!(parsed.use_gpu);
    }

    #[test]
    fn test_regressioner_bounded_output() {
        let device = Default::default();
        let model = RegressionerConfig::new(16, 3)
            .with_fc_layers(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 2>::random([8, 16], Distribution::Normal(0.0, 100.0), &device);
        let output = model.forward(x, None).unwrap();

        assert_eq!(output.prediction.dims(), [8, 3]);
        assert!(values(output.prediction).iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_regressioner_collects_stage_outputs() {
        let device = Default::default();
        let model = RegressionerConfig::new(16, 2)
            .with_fc_layers(4)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(model.num_stages(), 5);

        let x = Tensor::<TestBackend, 2>::ones([3, 16], &device);
        let output = model.forward(x, None).unwrap();
        let dims: Vec<[usize; 2]> = output.activations.iter().map(|a| a.dims()).collect();
        assert_eq!(dims, vec![[3, 512], [3, 256], [3, 256], [3, 128], [3, 2]]);

        // Prediction is the sigmoid of the last collected stage
        let last = output.activations.last().unwrap().clone();
        let expected = values(sigmoid(last));
        let got = values(output.prediction);
        for (g, e) in got.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dropout_stages_active_only_while_training() {
        let device = Default::default();
        let model = RegressionerConfig::new(16, 1)
            .with_fc_layers(2)
            .with_dropout(true)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let x = Tensor::<TestAutodiffBackend, 2>::random([8, 16], Distribution::Default, &device);

        // Dropped units come out of the leaky ReLU as exact zeros
        let zeros = |t: &Tensor<TestAutodiffBackend, 2>| {
            values(t.clone()).iter().filter(|v| **v == 0.0).count()
        };
        let training = model.forward(x.clone(), None).unwrap();
        assert_eq!(training.activations.len(), 3);
        assert_eq!(training.activations[0].dims(), [8, 512]);
        assert!(zeros(&training.activations[0]) > 0);
        assert!(values(training.prediction).iter().all(|v| (0.0..=1.0).contains(v)));

        let eval = model.valid();
        let inference = eval.forward(x.inner(), None).unwrap();
        let eval_zeros = values(inference.activations[0].clone())
            .iter()
            .filter(|v| **v == 0.0)
            .count();
        assert_eq!(eval_zeros, 0);
    }

    #[test]
    fn test_regressioner_end_layer() {
        let device = Default::default();
        let model = RegressionerConfig::new(16, 2)
            .with_fc_layers(3)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 2>::ones([1, 16], &device);

        let partial = model.forward(x.clone(), Some(2)).unwrap();
        assert_eq!(partial.activations.len(), 2);
        assert_eq!(partial.prediction.dims(), [1, 256]);

        let none = model.forward(x.clone(), Some(0)).unwrap();
        assert!(none.activations.is_empty());
        assert_eq!(none.prediction.dims(), [1, 16]);

        assert!(model.forward(x, Some(5)).is_err());
    }

    #[test]
    fn test_classifier_log_probabilities() {
        let device = Default::default();
        let model = ClassifierConfig::new(32)
            .with_fc_layers(5)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 2>::random([6, 32], Distribution::Normal(0.0, 10.0), &device);
        for alpha in [0.0, 0.3, 1.0, 25.0] {
            let log_probs = model.forward(x.clone(), alpha);
            assert_eq!(log_probs.dims(), [6, DOMAIN_CLASSES]);

            let row_sums = values(log_probs.exp().sum_dim(1));
            assert!(row_sums.iter().all(|s| (s - 1.0).abs() < 1e-5), "{:?}", row_sums);
        }
    }

    #[test]
    fn test_classifier_forward_matches_discriminate() {
        let device = Default::default();
        let model = ClassifierConfig::new(8).init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new((0..16).map(|v| v as f32 / 4.0).collect::<Vec<_>>(), [2, 8]),
            &device,
        );

        assert_eq!(
            values(model.forward(x.clone(), 0.8)),
            values(model.discriminate(x))
        );
    }

    #[test]
    fn test_classifier_reverses_input_gradient() {
        let device = Default::default();
        let alpha = 0.25;
        let model = ClassifierConfig::new(4)
            .with_fc_layers(1)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let data = TensorData::new(vec![0.5f32, -1.0, 2.0, 0.1], [1, 4]);

        let x = Tensor::<TestAutodiffBackend, 2>::from_data(data.clone(), &device).require_grad();
        let reversed = model.forward(x.clone(), alpha).narrow(1, 0, 1).sum();
        let reversed_grad = values(x.grad(&reversed.backward()).unwrap());

        let x = Tensor::<TestAutodiffBackend, 2>::from_data(data, &device).require_grad();
        let plain = model.discriminate(x.clone()).narrow(1, 0, 1).sum();
        let plain_grad = values(x.grad(&plain.backward()).unwrap());

        for (r, p) in reversed_grad.iter().zip(plain_grad.iter()) {
            assert!((r + alpha as f32 * p).abs() < 1e-5, "{} vs {}", r, p);
        }
    }
}
