use std::{fs, path::Path};

use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    layer::{
        LayerTuple, Network,
        OperatorKind::{DepthwiseConv, StandardConv},
    },
};

#[rustfmt::skip]
static MOBILENET_0_75: [LayerTuple; 19] = [
    ("conv_1x3x224x224_24x3x3x3_S2P1", StandardConv, [1, 3, 226, 226], &[24, 3, 3, 3], 2, 1),
    ("depthwise_1x24x112x112_24x3x3_S1P1", DepthwiseConv, [1, 24, 114, 114], &[24, 3, 3], 1, 1),
    ("conv_1x24x112x112_48x24x1x1_S1P0", StandardConv, [1, 24, 112, 112], &[48, 24, 1, 1], 1, 0),
    ("depthwise_1x48x112x112_48x3x3_S2P1", DepthwiseConv, [1, 48, 114, 114], &[48, 3, 3], 2, 1),
    ("conv_1x48x56x56_96x48x1x1_S1P0", StandardConv, [1, 48, 56, 56], &[96, 48, 1, 1], 1, 0),
    ("depthwise_1x96x56x56_96x3x3_S1P1", DepthwiseConv, [1, 96, 58, 58], &[96, 3, 3], 1, 1),
    ("conv_1x96x56x56_96x96x1x1_S1P0", StandardConv, [1, 96, 56, 56], &[96, 96, 1, 1], 1, 0),
    ("depthwise_1x96x56x56_96x3x3_S2P1", DepthwiseConv, [1, 96, 58, 58], &[96, 3, 3], 2, 1),
    ("conv_1x96x28x28_192x96x1x1_S1P0", StandardConv, [1, 96, 28, 28], &[192, 96, 1, 1], 1, 0),
    ("depthwise_1x192x28x28_192x3x3_S1P1", DepthwiseConv, [1, 192, 30, 30], &[192, 3, 3], 1, 1),
    ("conv_1x192x28x28_192x192x1x1_S1P0", StandardConv, [1, 192, 28, 28], &[192, 192, 1, 1], 1, 0),
    ("depthwise_1x192x28x28_192x3x3_S2P1", DepthwiseConv, [1, 192, 30, 30], &[192, 3, 3], 2, 1),
    ("conv_1x192x14x14_384x192x1x1_S1P0", StandardConv, [1, 192, 14, 14], &[384, 192, 1, 1], 1, 0),
    ("depthwise_1x384x14x14_384x3x3_S1P1", DepthwiseConv, [1, 384, 16, 16], &[384, 3, 3], 1, 1),
    // Historical label kept for log compatibility; the shapes are 384 channels.
    ("conv_1x128x14x14_128x128x1x1_S1P0", StandardConv, [1, 384, 14, 14], &[384, 384, 1, 1], 1, 0),
    ("depthwise_1x384x14x14_384x3x3_S2P1", DepthwiseConv, [1, 384, 16, 16], &[384, 3, 3], 2, 1),
    ("conv_1x384x7x7_768x384x1x1_S1P0", StandardConv, [1, 384, 7, 7], &[768, 384, 1, 1], 1, 0),
    ("depthwise_1x768x7x7_768x3x3_S1P1", DepthwiseConv, [1, 768, 9, 9], &[768, 3, 3], 1, 1),
    ("conv_1x768x7x7_768x768x1x1_S1P0", StandardConv, [1, 768, 7, 7], &[768, 768, 1, 1], 1, 0),
];

#[rustfmt::skip]
static MOBILENET_V2_0_25: [LayerTuple; 32] = [
    ("conv_1x3x224x224_8x3x3x3_S2P1", StandardConv, [1, 3, 226, 226], &[8, 3, 3, 3], 2, 1),
    ("conv_1x8x112x112_8x8x1x1_S1P0", StandardConv, [1, 8, 112, 112], &[8, 8, 1, 1], 1, 0),
    ("depthwise_1x8x112x112_8x3x3_S1P1", DepthwiseConv, [1, 8, 114, 114], &[8, 3, 3], 1, 1),
    ("conv_1x8x112x112_4x8x1x1_S1P0", StandardConv, [1, 8, 112, 112], &[4, 8, 1, 1], 1, 0),
    ("conv_1x4x112x112_24x4x1x1_S1P0", StandardConv, [1, 4, 112, 112], &[24, 4, 1, 1], 1, 0),
    ("depthwise_1x24x112x112_24x3x3_S2P1", DepthwiseConv, [1, 24, 114, 114], &[24, 3, 3], 2, 1),
    ("conv_1x24x56x56_6x24x1x1_S1P0", StandardConv, [1, 24, 56, 56], &[6, 24, 1, 1], 1, 0),
    ("conv_1x6x56x56_36x6x1x1_S1P0", StandardConv, [1, 6, 56, 56], &[36, 6, 1, 1], 1, 0),
    ("depthwise_1x36x56x56_36x3x3_S1P1", DepthwiseConv, [1, 36, 58, 58], &[36, 3, 3], 1, 1),
    ("conv_1x36x56x56_6x36x1x1_S1P0", StandardConv, [1, 36, 56, 56], &[6, 36, 1, 1], 1, 0),
    ("depthwise_1x36x56x56_36x3x3_S2P1", DepthwiseConv, [1, 36, 58, 58], &[36, 3, 3], 2, 1),
    ("conv_1x36x28x28_8x36x1x1_S1P0", StandardConv, [1, 36, 28, 28], &[8, 36, 1, 1], 1, 0),
    ("conv_1x8x28x28_48x8x1x1_S1P0", StandardConv, [1, 8, 28, 28], &[48, 8, 1, 1], 1, 0),
    ("depthwise_1x48x28x28_48x3x3_S1P1", DepthwiseConv, [1, 48, 30, 30], &[48, 3, 3], 1, 1),
    ("conv_1x48x28x28_8x48x1x1_S1P0", StandardConv, [1, 48, 28, 28], &[8, 48, 1, 1], 1, 0),
    ("depthwise_1x48x28x28_48x3x3_S2P1", DepthwiseConv, [1, 48, 30, 30], &[48, 3, 3], 2, 1),
    ("conv_1x48x14x14_16x48x1x1_S1P0", StandardConv, [1, 48, 14, 14], &[16, 48, 1, 1], 1, 0),
    ("conv_1x16x14x14_96x16x1x1_S1P0", StandardConv, [1, 16, 14, 14], &[96, 16, 1, 1], 1, 0),
    ("depthwise_1x96x14x14_96x3x3_S1P1", DepthwiseConv, [1, 96, 16, 16], &[96, 3, 3], 1, 1),
    ("conv_1x96x14x14_16x96x1x1_S1P0", StandardConv, [1, 96, 14, 14], &[16, 96, 1, 1], 1, 0),
    ("conv_1x96x14x14_24x96x1x1_S1P0", StandardConv, [1, 96, 14, 14], &[24, 96, 1, 1], 1, 0),
    ("conv_1x24x14x14_144x24x1x1_S1P0", StandardConv, [1, 24, 14, 14], &[144, 24, 1, 1], 1, 0),
    ("depthwise_1x144x14x14_144x3x3_S1P1", DepthwiseConv, [1, 144, 16, 16], &[144, 3, 3], 1, 1),
    ("conv_1x144x14x14_24x144x1x1_S1P0", StandardConv, [1, 144, 14, 14], &[24, 144, 1, 1], 1, 0),
    ("depthwise_1x144x14x14_144x3x3_S2P1", DepthwiseConv, [1, 144, 16, 16], &[144, 3, 3], 2, 1),
    ("conv_1x144x7x7_40x144x1x1_S1P0", StandardConv, [1, 144, 7, 7], &[40, 144, 1, 1], 1, 0),
    ("conv_1x40x7x7_240x40x1x1_S1P0", StandardConv, [1, 40, 7, 7], &[240, 40, 1, 1], 1, 0),
    ("depthwise_1x240x7x7_240x3x3_S1P1", DepthwiseConv, [1, 240, 9, 9], &[240, 3, 3], 1, 1),
    ("conv_1x240x7x7_40x240x1x1_S1P0", StandardConv, [1, 240, 7, 7], &[40, 240, 1, 1], 1, 0),
    ("conv_1x240x7x7_80x240x1x1_S1P0", StandardConv, [1, 240, 7, 7], &[80, 240, 1, 1], 1, 0),
    ("conv_1x80x7x7_1280x80x1x1_S1P0", StandardConv, [1, 80, 7, 7], &[1280, 80, 1, 1], 1, 0),
    ("conv_1x1280x7x7_1000x1280x1x1_S1P0", StandardConv, [1, 1280, 7, 7], &[1000, 1280, 1, 1], 1, 0),
];

#[rustfmt::skip]
static RESNET18: [LayerTuple; 11] = [
    ("conv_1x3x224x224_64x3x7x7_S2P3", StandardConv, [1, 3, 230, 230], &[64, 3, 7, 7], 2, 3),
    ("conv_1x64x56x56_64x64x3x3_S1P1", StandardConv, [1, 64, 58, 58], &[64, 64, 3, 3], 1, 1),
    ("conv_1x64x56x56_128x64x3x3_S2P1", StandardConv, [1, 64, 58, 58], &[128, 64, 3, 3], 2, 1),
    ("conv_1x64x56x56_128x64x1x1_S2P0", StandardConv, [1, 64, 56, 56], &[128, 64, 1, 1], 2, 0),
    ("conv_1x128x28x28_128x128x3x3_S1P1", StandardConv, [1, 128, 30, 30], &[128, 128, 3, 3], 1, 1),
    ("conv_1x128x28x28_256x128x3x3_S2P1", StandardConv, [1, 128, 30, 30], &[256, 128, 3, 3], 2, 1),
    ("conv_1x128x28x28_256x128x1x1_S2P0", StandardConv, [1, 128, 28, 28], &[256, 128, 1, 1], 2, 0),
    ("conv_1x256x14x14_256x256x3x3_S1P1", StandardConv, [1, 256, 16, 16], &[256, 256, 3, 3], 1, 1),
    ("conv_1x256x14x14_512x256x3x3_S2P1", StandardConv, [1, 256, 16, 16], &[512, 256, 3, 3], 2, 1),
    ("conv_1x256x14x14_512x256x1x1_S2P0", StandardConv, [1, 256, 14, 14], &[512, 256, 1, 1], 2, 0),
    ("conv_1x512x7x7_512x512x3x3_S1P1", StandardConv, [1, 512, 9, 9], &[512, 512, 3, 3], 1, 1),
];
/// Ordered layer groups, one per network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    networks: Vec<Network>,
}

impl Catalog {
    pub fn new(networks: Vec<Network>) -> Catalog {
        Catalog { networks }
    }

    pub fn builtin() -> Catalog {
        Catalog::new(vec![
            Network::new("mobilenet-0.75", "mobilenet", &MOBILENET_0_75),
            Network::new("mobilenetv2-0.25", "mobilenet", &MOBILENET_V2_0_25),
            Network::new("resnet18", "resnet", &RESNET18),
        ])
    }

    /// Loads a JSON array of networks. Layers that fail validation are kept
    /// so that they fail in their own measurement instead of up front.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Catalog> {
        let path = path.as_ref();
        info!("loading layer catalog from {:?}", path);
        let content = fs::read_to_string(path)?;
        let networks: Vec<Network> = serde_json::from_str(&content)?;

        let catalog = Catalog::new(networks);
        for err in catalog.problems() {
            warn!("{}", err);
        }
        Ok(catalog)
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn keys(&self) -> Vec<&str> {
        self.networks.iter().map(|n| n.key.as_str()).collect()
    }

    pub fn network(&self, key: &str) -> Result<&Network> {
        self.networks
            .iter()
            .find(|n| n.key == key)
            .ok_or_else(|| Error::UnknownNetwork(key.to_owned()))
    }

    /// Networks named by `keys` in the given order, or all of them when
    /// `keys` is empty.
    pub fn select(&self, keys: &[String]) -> Result<Vec<&Network>> {
        if keys.is_empty() {
            return Ok(self.networks.iter().collect());
        }
        keys.iter().map(|key| self.network(key)).collect()
    }

    pub fn problems(&self) -> Vec<Error> {
        self.networks
            .iter()
            .flat_map(|n| n.layers.iter())
            .filter_map(|layer| layer.validate().err())
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::builtin()
    }
}
