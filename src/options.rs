use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layer::OperatorKind;

/// How a compiled kernel is laid out on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingOptions {
    /// Threads per block; the grid covers the output.
    pub block: [u32; 3],
}

impl MappingOptions {
    pub fn naive() -> MappingOptions {
        MappingOptions {
            block: [32, 8, 1],
        }
    }
}

impl Default for MappingOptions {
    fn default() -> Self {
        MappingOptions::naive()
    }
}

/// Genetic tuner knobs. Accepted for command line compatibility; no search
/// is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunerConfig {
    pub threads: u32,
    pub pop_size: u32,
    pub generations: u32,
    pub number_elites: u32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        TunerConfig {
            threads: 10,
            pop_size: 10,
            generations: 3,
            number_elites: 4,
        }
    }
}

/// Best mapping options for an instantiated kernel. Always the naive
/// options.
pub fn best_options(kind: OperatorKind, spec_text: &str, tuner: &TunerConfig) -> MappingOptions {
    debug!(
        "best options for {} ({} bytes of kernel text), tuner {:?}: naive",
        kind,
        spec_text.len(),
        tuner
    );
    MappingOptions::naive()
}
