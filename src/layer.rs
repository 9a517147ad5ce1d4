use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    tensor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    StandardConv,
    DepthwiseConv,
}

impl OperatorKind {
    /// Prefix used by layer names, e.g. `depthwise_1x24x112x112_24x3x3_S1P1`.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            OperatorKind::StandardConv => "conv",
            OperatorKind::DepthwiseConv => "depthwise",
        }
    }

    pub fn kernel_rank(&self) -> usize {
        match self {
            OperatorKind::StandardConv => 4,
            OperatorKind::DepthwiseConv => 3,
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_prefix())
    }
}

/// (name, kind, padded input shape, kernel shape, stride, padding)
pub type LayerTuple = (
    &'static str,
    OperatorKind,
    [usize; 4],
    &'static [usize],
    usize,
    usize,
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub operator_kind: OperatorKind,
    /// Already padded; this is the tensor handed to the kernel.
    pub input_shape: [usize; 4],
    /// `[M, C, KH, KW]` for standard conv, `[C, KH, KW]` for depthwise conv.
    pub kernel_shape: Vec<usize>,
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
}

impl LayerSpec {
    pub fn from_tuple(tuple: LayerTuple) -> LayerSpec {
        LayerSpec {
            name: tuple.0.to_owned(),
            operator_kind: tuple.1,
            input_shape: tuple.2,
            kernel_shape: tuple.3.to_vec(),
            stride: tuple.4,
            padding: tuple.5,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidLayer {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(self.invalid("stride must be positive"));
        }

        tensor::checked_numel(&self.input_shape).map_err(|e| self.invalid(e.to_string()))?;
        tensor::checked_numel(&self.kernel_shape).map_err(|e| self.invalid(e.to_string()))?;

        let rank = self.operator_kind.kernel_rank();
        if self.kernel_shape.len() != rank {
            return Err(self.invalid(format!(
                "{} kernel must have rank {}, got {:?}",
                self.operator_kind, rank, self.kernel_shape
            )));
        }

        let channels = self.input_shape[1];
        let kernel_channels = match self.operator_kind {
            OperatorKind::StandardConv => self.kernel_shape[1],
            OperatorKind::DepthwiseConv => self.kernel_shape[0],
        };
        if channels != kernel_channels {
            return Err(self.invalid(format!(
                "input has {} channels but kernel expects {}",
                channels, kernel_channels
            )));
        }

        let (kernel_height, kernel_width) = self.kernel_extent();
        if kernel_height > self.input_shape[2] || kernel_width > self.input_shape[3] {
            return Err(self.invalid(format!(
                "kernel {}x{} larger than input {}x{}",
                kernel_height, kernel_width, self.input_shape[2], self.input_shape[3]
            )));
        }

        Ok(())
    }

    pub fn kernel_extent(&self) -> (usize, usize) {
        let rank = self.kernel_shape.len();
        if rank < 2 {
            return (0, 0);
        }
        (self.kernel_shape[rank - 2], self.kernel_shape[rank - 1])
    }

    /// Name derived from the shapes, in the `conv_1x64x56x56_128x64x3x3_S2P1`
    /// convention where the input dims are the unpadded ones.
    pub fn canonical_name(&self) -> String {
        let [n, c, h, w] = self.input_shape;
        let kernel = self
            .kernel_shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        format!(
            "{}_{}x{}x{}x{}_{}_S{}P{}",
            self.operator_kind.name_prefix(),
            n,
            c,
            h.saturating_sub(2 * self.padding),
            w.saturating_sub(2 * self.padding),
            kernel,
            self.stride,
            self.padding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub key: String,
    pub report_prefix: String,
    pub layers: Vec<LayerSpec>,
}

impl Network {
    pub fn new(key: &str, report_prefix: &str, layers: &[LayerTuple]) -> Network {
        Network {
            key: key.to_owned(),
            report_prefix: report_prefix.to_owned(),
            layers: layers.iter().copied().map(LayerSpec::from_tuple).collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LayerSpec> {
        self.layers.iter()
    }

    /// Distinct (kind, stride) variants in first-use order.
    pub fn variants(&self) -> Vec<(OperatorKind, usize)> {
        let mut variants = Vec::new();
        for layer in &self.layers {
            let variant = (layer.operator_kind, layer.stride);
            if !variants.contains(&variant) {
                variants.push(variant);
            }
        }
        variants
    }
}

impl<'a> IntoIterator for &'a Network {
    type Item = &'a LayerSpec;
    type IntoIter = std::slice::Iter<'a, LayerSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resnet_stem() -> LayerSpec {
        LayerSpec::from_tuple((
            "conv_1x3x224x224_64x3x7x7_S2P3",
            OperatorKind::StandardConv,
            [1, 3, 230, 230],
            &[64, 3, 7, 7],
            2,
            3,
        ))
    }

    #[test]
    fn canonical_name_strips_padding() {
        let layer = resnet_stem();

        assert_eq!(layer.canonical_name(), layer.name);
        assert!(layer.validate().is_ok());
    }

    #[test]
    fn depthwise_channels_come_from_first_kernel_dim() {
        let layer = LayerSpec::from_tuple((
            "depthwise_1x24x112x112_24x3x3_S1P1",
            OperatorKind::DepthwiseConv,
            [1, 24, 114, 114],
            &[24, 3, 3],
            1,
            1,
        ));

        assert!(layer.validate().is_ok());
        assert_eq!(layer.kernel_extent(), (3, 3));
        assert_eq!(layer.canonical_name(), layer.name);
    }

    #[test]
    fn channel_mismatch_is_invalid() {
        let mut layer = resnet_stem();
        layer.kernel_shape = vec![64, 4, 7, 7];

        assert!(matches!(
            layer.validate(),
            Err(Error::InvalidLayer { .. })
        ));
    }

    #[test]
    fn wrong_rank_is_invalid() {
        let mut layer = resnet_stem();
        layer.operator_kind = OperatorKind::DepthwiseConv;

        assert!(layer.validate().is_err());
    }

    #[test]
    fn oversized_input_is_invalid() {
        let mut layer = resnet_stem();
        layer.input_shape = [1 << 32, 1 << 32, 230, 230];

        assert!(matches!(
            layer.validate(),
            Err(Error::InvalidLayer { .. })
        ));
    }

    #[test]
    fn zero_stride_is_invalid() {
        let mut layer = resnet_stem();
        layer.stride = 0;

        assert!(layer.validate().is_err());
    }

    #[test]
    fn variants_keep_first_use_order() {
        let network = Network::new(
            "tiny",
            "tiny",
            &[
                ("a", OperatorKind::StandardConv, [1, 3, 8, 8], &[4, 3, 3, 3], 2, 0),
                ("b", OperatorKind::DepthwiseConv, [1, 4, 8, 8], &[4, 3, 3], 1, 0),
                ("c", OperatorKind::StandardConv, [1, 4, 8, 8], &[4, 4, 1, 1], 2, 0),
            ],
        );

        assert_eq!(
            network.variants(),
            vec![
                (OperatorKind::StandardConv, 2),
                (OperatorKind::DepthwiseConv, 1)
            ]
        );
        assert_eq!(network.iter().count(), 3);
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "name": "conv_1x8x4x4_2x8x1x1_S1P0",
            "operator_kind": "standard_conv",
            "input_shape": [1, 8, 4, 4],
            "kernel_shape": [2, 8, 1, 1],
            "stride": 1
        }"#;
        let layer: LayerSpec = serde_json::from_str(json).unwrap();

        assert_eq!(layer.padding, 0);
        assert_eq!(layer.canonical_name(), layer.name);
    }
}
