//! The compile / prepare-outputs / profile capability the harness drives.

use serde::Serialize;

use crate::{error::Result, options::MappingOptions, tensor::Tensor};

pub mod cpu;
pub mod cuda;

/// Opaque reference to a kernel owned by the backend that compiled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub(crate) usize);

impl KernelHandle {
    pub fn new(id: usize) -> KernelHandle {
        KernelHandle(id)
    }

    pub fn id(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilingInfo {
    /// Device-side runtime of one execution, in microseconds.
    pub kernel_runtime: f64,
}

pub trait Backend {
    fn name(&self) -> &'static str;

    /// Compiles `entry` from the kernel text for the shapes of `inputs`.
    /// The returned kernel accepts any inputs whose shapes bind to the same
    /// definition.
    fn compile(
        &mut self,
        spec: &str,
        entry: &str,
        inputs: &[&Tensor],
        options: &MappingOptions,
    ) -> Result<KernelHandle>;

    /// Allocates the output tensors `entry` produces for `inputs`.
    fn prepare_outputs(&mut self, spec: &str, entry: &str, inputs: &[&Tensor])
        -> Result<Vec<Tensor>>;

    /// Runs the kernel once and reports how long it took.
    fn profile(
        &mut self,
        handle: KernelHandle,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
    ) -> Result<ProfilingInfo>;

    /// Uniform random tensor in [-1, 1).
    fn make_tensor(&mut self, shape: &[usize]) -> Tensor;
}

pub fn shapes_of<'a>(inputs: &'a [&Tensor]) -> Vec<&'a [usize]> {
    inputs.iter().map(|t| t.shape.as_slice()).collect()
}
