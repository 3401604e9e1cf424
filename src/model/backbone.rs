//! 1D ResNet backbones for multi-channel signal windows
//!
//! The backbone keeps the time axis: it maps `[batch, channels, time_len]` to
//! `[batch, out_channels, time_steps]` with no global pooling or classifier, so
//! the temporal aggregator downstream sees one vector per remaining time step.

use burn::{
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{MaxPool1d, MaxPool1dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig1d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::{BackboneKind, ResNetDepth};

/// Base channel widths of the four residual stages
const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// Channels produced by the stem convolution
const STEM_CHANNELS: usize = 64;

fn conv1d<B: Backend>(
    channels_in: usize,
    channels_out: usize,
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv1d<B> {
    Conv1dConfig::new(channels_in, channels_out, kernel_size)
        .with_stride(stride)
        .with_padding(PaddingConfig1d::Explicit(kernel_size / 2))
        .with_bias(false)
        .init(device)
}

/// Projection shortcut used when a block changes stride or width
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv1d<B>,
    bn: BatchNorm<B, 1>,
}

impl<B: Backend> Downsample<B> {
    fn new(channels_in: usize, channels_out: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv1d(channels_in, channels_out, 1, stride, device),
            bn: BatchNormConfig::new(channels_out).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Basic residual block with two 3-wide convolutions
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv1d<B>,
    bn1: BatchNorm<B, 1>,
    conv2: Conv1d<B>,
    bn2: BatchNorm<B, 1>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    /// Expansion factor for this block type
    pub const EXPANSION: usize = 1;

    pub fn new(channels_in: usize, width: usize, stride: usize, device: &B::Device) -> Self {
        let channels_out = width * Self::EXPANSION;
        let downsample = (stride != 1 || channels_in != channels_out)
            .then(|| Downsample::new(channels_in, channels_out, stride, device));

        Self {
            conv1: conv1d(channels_in, width, 3, stride, device),
            bn1: BatchNormConfig::new(width).init(device),
            conv2: conv1d(width, channels_out, 3, 1, device),
            bn2: BatchNormConfig::new(channels_out).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));

        self.relu.forward(out + identity)
    }
}

/// Bottleneck residual block (1x1 reduce, 3-wide, 1x1 expand)
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv1d<B>,
    bn1: BatchNorm<B, 1>,
    conv2: Conv1d<B>,
    bn2: BatchNorm<B, 1>,
    conv3: Conv1d<B>,
    bn3: BatchNorm<B, 1>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> Bottleneck<B> {
    /// Expansion factor for this block type
    pub const EXPANSION: usize = 4;

    pub fn new(channels_in: usize, width: usize, stride: usize, device: &B::Device) -> Self {
        let channels_out = width * Self::EXPANSION;
        let downsample = (stride != 1 || channels_in != channels_out)
            .then(|| Downsample::new(channels_in, channels_out, stride, device));

        Self {
            conv1: conv1d(channels_in, width, 1, 1, device),
            bn1: BatchNormConfig::new(width).init(device),
            conv2: conv1d(width, width, 3, stride, device),
            bn2: BatchNormConfig::new(width).init(device),
            conv3: conv1d(width, channels_out, 1, 1, device),
            bn3: BatchNormConfig::new(channels_out).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.relu.forward(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));

        self.relu.forward(out + identity)
    }
}

/// Either residual block flavour
#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    Basic(BasicBlock<B>),
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            ResidualBlock::Basic(block) => block.forward(x),
            ResidualBlock::Bottleneck(block) => block.forward(x),
        }
    }
}

/// ResNet over the time axis
#[derive(Module, Debug)]
pub struct ResNet1d<B: Backend> {
    stem: Conv1d<B>,
    stem_bn: BatchNorm<B, 1>,
    relu: Relu,
    maxpool: MaxPool1d,
    blocks: Vec<ResidualBlock<B>>,
    out_channels: usize,
}

impl<B: Backend> ResNet1d<B> {
    /// Build the ResNet variant for `depth` reading `in_channels` input channels
    pub fn new(depth: ResNetDepth, in_channels: usize, device: &B::Device) -> Self {
        let stem = Conv1dConfig::new(in_channels, STEM_CHANNELS, 7)
            .with_stride(2)
            .with_padding(PaddingConfig1d::Explicit(3))
            .with_bias(false)
            .init(device);
        let stem_bn = BatchNormConfig::new(STEM_CHANNELS).init(device);
        let maxpool = MaxPool1dConfig::new(3)
            .with_stride(2)
            .with_padding(PaddingConfig1d::Explicit(1))
            .init();

        let expansion = if depth.uses_bottleneck() {
            Bottleneck::<B>::EXPANSION
        } else {
            BasicBlock::<B>::EXPANSION
        };

        let mut blocks = Vec::new();
        let mut channels = STEM_CHANNELS;
        for (stage, (&width, &count)) in STAGE_WIDTHS
            .iter()
            .zip(depth.blocks_per_stage().iter())
            .enumerate()
        {
            let first_stride = if stage == 0 { 1 } else { 2 };
            for i in 0..count {
                let stride = if i == 0 { first_stride } else { 1 };
                let block = if depth.uses_bottleneck() {
                    ResidualBlock::Bottleneck(Bottleneck::new(channels, width, stride, device))
                } else {
                    ResidualBlock::Basic(BasicBlock::new(channels, width, stride, device))
                };
                blocks.push(block);
                channels = width * expansion;
            }
        }

        Self {
            stem,
            stem_bn,
            relu: Relu::new(),
            maxpool,
            blocks,
            out_channels: channels,
        }
    }

    /// `[batch, in_channels, time_len]` -> `[batch, out_channels, time_steps]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.relu.forward(self.stem_bn.forward(self.stem.forward(x)));
        let x = self.maxpool.forward(x);

        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// Backbone network selected by [`BackboneKind`]
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    ResNet(ResNet1d<B>),
}

impl<B: Backend> Backbone<B> {
    pub fn new(kind: BackboneKind, in_channels: usize, device: &B::Device) -> Self {
        match kind {
            BackboneKind::ResNet(depth) => Backbone::ResNet(ResNet1d::new(depth, in_channels, device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            Backbone::ResNet(net) => net.forward(x),
        }
    }

    pub fn out_channels(&self) -> usize {
        match self {
            Backbone::ResNet(net) => net.out_channels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_resnet18_output_shape() {
        let device = Default::default();
        let net = ResNet1d::<TestBackend>::new(ResNetDepth::D18, 3, &device);
        assert_eq!(net.num_blocks(), 8);

        let input = Tensor::<TestBackend, 3>::zeros([2, 3, 64], &device);
        let output = net.forward(input);

        assert_eq!(output.dims(), [2, 512, ResNetDepth::D18.output_len(64)]);
    }

    #[test]
    fn test_resnet50_uses_bottleneck_width() {
        let device = Default::default();
        let backbone = Backbone::<TestBackend>::new(
            BackboneKind::ResNet(ResNetDepth::D50),
            1,
            &device,
        );
        assert_eq!(backbone.out_channels(), 2048);

        let input = Tensor::<TestBackend, 3>::ones([1, 1, 32], &device);
        let output = backbone.forward(input);
        assert_eq!(output.dims(), [1, 2048, 1]);
    }

    #[test]
    fn test_deep_bottleneck_variants() {
        let device = Default::default();
        for (depth, blocks) in [(ResNetDepth::D101, 33), (ResNetDepth::D152, 50)] {
            let net = ResNet1d::<TestBackend>::new(depth, 2, &device);
            assert_eq!(net.num_blocks(), blocks);
            assert_eq!(net.out_channels(), 2048);

            let output = net.forward(Tensor::<TestBackend, 3>::ones([1, 2, 32], &device));
            assert_eq!(output.dims(), [1, 2048, depth.output_len(32)]);
        }
    }

    #[test]
    fn test_out_channels_match_config_table() {
        let device = Default::default();
        for depth in [ResNetDepth::D18, ResNetDepth::D34] {
            let net = ResNet1d::<TestBackend>::new(depth, 2, &device);
            assert_eq!(net.out_channels(), depth.out_channels());
        }
    }

    #[test]
    fn test_basic_block_identity_shortcut() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(64, 64, 1, &device);
        assert!(block.downsample.is_none());

        let strided = BasicBlock::<TestBackend>::new(64, 128, 2, &device);
        assert!(strided.downsample.is_some());
        let out = strided.forward(Tensor::zeros([1, 64, 8], &device));
        assert_eq!(out.dims(), [1, 128, 4]);
    }
}
