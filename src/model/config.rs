//! Model Configuration Module
//!
//! Closed enumerations for every architecture choice the network exposes.
//! Names coming from configuration files or the command line are resolved here,
//! once, into typed variants; anything unknown becomes a [`DannError`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::{DannError, Result};

/// Width of the 1x1 projection applied after the temporal aggregator
pub const PROJECTION_CHANNELS: usize = 512;

/// Hidden widths of the fully connected stages, indexed by stage
pub const FC_WIDTHS: [usize; 5] = [512, 256, 256, 128, 128];

/// Largest supported fully connected depth
pub const MAX_FC_LAYERS: usize = FC_WIDTHS.len();

/// Dropout probability used inside fully connected stages
pub const STAGE_DROPOUT: f64 = 0.1;

/// Backbone families that exist upstream but have no implementation here
const UNIMPLEMENTED_FAMILIES: [&str; 6] = [
    "vgg",
    "googlenet",
    "inceptionv3",
    "inceptionv4",
    "densenet",
    "alexnet",
];

/// ResNet depth variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum ResNetDepth {
    D18,
    D34,
    D50,
    D101,
    D152,
}

impl ResNetDepth {
    /// All supported depths in ascending order
    pub const ALL: [ResNetDepth; 5] = [
        ResNetDepth::D18,
        ResNetDepth::D34,
        ResNetDepth::D50,
        ResNetDepth::D101,
        ResNetDepth::D152,
    ];

    /// Number of layers as an integer
    pub fn layers(&self) -> usize {
        match self {
            ResNetDepth::D18 => 18,
            ResNetDepth::D34 => 34,
            ResNetDepth::D50 => 50,
            ResNetDepth::D101 => 101,
            ResNetDepth::D152 => 152,
        }
    }

    /// Residual blocks per stage
    pub fn blocks_per_stage(&self) -> [usize; 4] {
        match self {
            ResNetDepth::D18 => [2, 2, 2, 2],
            ResNetDepth::D34 | ResNetDepth::D50 => [3, 4, 6, 3],
            ResNetDepth::D101 => [3, 4, 23, 3],
            ResNetDepth::D152 => [3, 8, 36, 3],
        }
    }

    /// Whether the stages use 1-3-1 bottleneck blocks
    pub fn uses_bottleneck(&self) -> bool {
        matches!(self, ResNetDepth::D50 | ResNetDepth::D101 | ResNetDepth::D152)
    }

    /// Channel count of the final stage
    pub fn out_channels(&self) -> usize {
        if self.uses_bottleneck() {
            2048
        } else {
            512
        }
    }

    /// Time steps left after the stem, the max pool and the three strided stages
    pub fn output_len(&self, time_len: usize) -> usize {
        (0..5).fold(time_len, |len, _| len.saturating_sub(1) / 2 + 1)
    }

    fn supported() -> Vec<usize> {
        Self::ALL.iter().map(|d| d.layers()).collect()
    }
}

impl TryFrom<usize> for ResNetDepth {
    type Error = DannError;

    fn try_from(depth: usize) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.layers() == depth)
            .ok_or_else(|| DannError::InvalidBackboneDepth {
                family: "resnet".to_string(),
                depth,
                supported: Self::supported(),
            })
    }
}

impl From<ResNetDepth> for usize {
    fn from(depth: ResNetDepth) -> usize {
        depth.layers()
    }
}

/// Convolutional backbone selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", content = "depth", rename_all = "lowercase")]
pub enum BackboneKind {
    ResNet(ResNetDepth),
}

impl BackboneKind {
    /// Resolve a family name and depth, e.g. `("resnet", 34)`
    pub fn from_parts(family: &str, depth: usize) -> Result<Self> {
        let family = family.trim().to_lowercase();
        match family.as_str() {
            "resnet" => Ok(BackboneKind::ResNet(ResNetDepth::try_from(depth)?)),
            _ => {
                if Self::is_known_family(&family) {
                    tracing::debug!("backbone family '{}' is recognised but not built", family);
                }
                Err(DannError::UnsupportedBackbone(family))
            }
        }
    }

    /// Family names recognised from upstream configurations but not built here
    pub fn is_known_family(family: &str) -> bool {
        let family = family.to_lowercase();
        family == "resnet" || UNIMPLEMENTED_FAMILIES.contains(&family.as_str())
    }

    /// Channel count produced by the backbone
    pub fn out_channels(&self) -> usize {
        match self {
            BackboneKind::ResNet(depth) => depth.out_channels(),
        }
    }

    /// Time steps produced for a window of `time_len`
    pub fn output_len(&self, time_len: usize) -> usize {
        match self {
            BackboneKind::ResNet(depth) => depth.output_len(time_len),
        }
    }
}

impl Default for BackboneKind {
    fn default() -> Self {
        BackboneKind::ResNet(ResNetDepth::D18)
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackboneKind::ResNet(depth) => write!(f, "resnet{}", depth.layers()),
        }
    }
}

/// Temporal aggregator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalKind {
    /// Single-layer LSTM with bias
    #[default]
    Lstm,
}

impl FromStr for TemporalKind {
    type Err = DannError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lstm" => Ok(TemporalKind::Lstm),
            other => Err(DannError::NotImplemented(format!(
                "temporal aggregator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TemporalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalKind::Lstm => write!(f, "lstm"),
        }
    }
}

/// How the recurrent cell state is seeded when the hidden state is reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellInit {
    /// Cell state gets its own Xavier draw
    #[default]
    Independent,
    /// Cell state is a copy of the hidden state draw
    MirrorHidden,
}

/// Validate a fully connected depth
pub fn check_fc_layers(fc_layers: usize) -> Result<()> {
    if fc_layers == 0 || fc_layers > MAX_FC_LAYERS {
        return Err(DannError::InvalidFcLayers(fc_layers));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resnet_depth_lookup() {
        assert_eq!(ResNetDepth::try_from(18).unwrap(), ResNetDepth::D18);
        assert_eq!(ResNetDepth::try_from(152).unwrap(), ResNetDepth::D152);
        assert!(matches!(
            ResNetDepth::try_from(20),
            Err(DannError::InvalidBackboneDepth { depth: 20, .. })
        ));
    }

    #[test]
    fn test_out_channels_table() {
        let widths: Vec<usize> = ResNetDepth::ALL.iter().map(|d| d.out_channels()).collect();
        assert_eq!(widths, vec![512, 512, 2048, 2048, 2048]);
    }

    #[test]
    fn test_output_len() {
        let depth = ResNetDepth::D18;
        // 32 -> 16 -> 8 -> 4 -> 2 -> 1
        assert_eq!(depth.output_len(32), 1);
        assert_eq!(depth.output_len(64), 2);
        assert_eq!(depth.output_len(100), 4);
        assert_eq!(depth.output_len(1), 1);
    }

    #[test]
    fn test_backbone_from_parts() {
        assert_eq!(
            BackboneKind::from_parts("ResNet", 50).unwrap(),
            BackboneKind::ResNet(ResNetDepth::D50)
        );
        assert!(matches!(
            BackboneKind::from_parts("resnet", 19),
            Err(DannError::InvalidBackboneDepth { .. })
        ));
        assert!(matches!(
            BackboneKind::from_parts("vgg", 16),
            Err(DannError::UnsupportedBackbone(_))
        ));
        assert!(matches!(
            BackboneKind::from_parts("transformer", 12),
            Err(DannError::UnsupportedBackbone(_))
        ));
    }

    #[test]
    fn test_known_families() {
        assert!(BackboneKind::is_known_family("densenet"));
        assert!(BackboneKind::is_known_family("RESNET"));
        assert!(!BackboneKind::is_known_family("mobilenet"));
    }

    #[test]
    fn test_backbone_json_shape() {
        let json = serde_json::to_string(&BackboneKind::ResNet(ResNetDepth::D34)).unwrap();
        assert_eq!(json, r#"{"family":"resnet","depth":34}"#);

        let parsed: BackboneKind = serde_json::from_str(r#"{"family":"resnet","depth":101}"#).unwrap();
        assert_eq!(parsed, BackboneKind::ResNet(ResNetDepth::D101));

        let bad = serde_json::from_str::<BackboneKind>(r#"{"family":"resnet","depth":42}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_temporal_kind_parse() {
        assert_eq!("LSTM".parse::<TemporalKind>().unwrap(), TemporalKind::Lstm);
        assert!(matches!(
            "gru".parse::<TemporalKind>(),
            Err(DannError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_fc_layers_range() {
        assert!(check_fc_layers(0).is_err());
        assert!(check_fc_layers(1).is_ok());
        assert!(check_fc_layers(5).is_ok());
        assert!(check_fc_layers(6).is_err());
    }
}
