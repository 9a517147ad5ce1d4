use std::time::Instant;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    lang::{
        self,
        lower::{ConvPlan, ConvShapes},
        Program,
    },
    layer::OperatorKind,
    options::MappingOptions,
    tensor::Tensor,
    util,
};

use super::{shapes_of, Backend, KernelHandle, ProfilingInfo};

/// Reference backend running the lowered convolution as a direct loop nest
/// on the host.
pub struct CpuBackend {
    kernels: Vec<Program>,
    rng: Option<StdRng>,
}

impl CpuBackend {
    pub fn new(seed: Option<u64>) -> CpuBackend {
        CpuBackend {
            kernels: Vec::new(),
            rng: seed.map(StdRng::seed_from_u64),
        }
    }

    pub fn kernel_count(&self) -> usize {
        self.kernels.len()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        CpuBackend::new(None)
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn compile(
        &mut self,
        spec: &str,
        entry: &str,
        inputs: &[&Tensor],
        options: &MappingOptions,
    ) -> Result<KernelHandle> {
        let program = lang::compile(spec, entry)?;
        let shapes = program.bind(&shapes_of(inputs))?;
        debug!(
            "compiled {} for {:?} (options ignored: {:?})",
            program.plan.kind,
            shapes.output_shape(),
            options
        );

        self.kernels.push(program);
        Ok(KernelHandle(self.kernels.len() - 1))
    }

    fn prepare_outputs(
        &mut self,
        spec: &str,
        entry: &str,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>> {
        let program = lang::compile(spec, entry)?;
        let shapes = program.bind(&shapes_of(inputs))?;
        let shape = shapes.output_shape();
        crate::tensor::checked_numel(&shape)?;
        Ok(vec![Tensor::zeros(shape)])
    }

    fn profile(
        &mut self,
        handle: KernelHandle,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
    ) -> Result<ProfilingInfo> {
        let program = self
            .kernels
            .get(handle.0)
            .ok_or(Error::UnknownHandle(handle.0))?;
        let shapes = program.bind(&shapes_of(inputs))?;
        let output = match outputs {
            [output] if output.numel() == shapes.output_len() => output,
            _ => {
                return Err(Error::ShapeMismatch {
                    symbol: program.definition.outputs.join(","),
                    message: format!(
                        "outputs do not hold a single {:?} tensor",
                        shapes.output_shape()
                    ),
                })
            }
        };

        let start = Instant::now();
        run(&program.plan, &shapes, inputs[0], inputs[1], &mut output.data);
        let elapsed = start.elapsed();
        output.shape = shapes.output_shape();

        let kernel_runtime = elapsed.as_secs_f64() * 1.0e6;
        trace!("{} ran in {} us", program.plan.kind, kernel_runtime);
        Ok(ProfilingInfo { kernel_runtime })
    }

    fn make_tensor(&mut self, shape: &[usize]) -> Tensor {
        match &mut self.rng {
            Some(rng) => Tensor::rand_with(shape.to_vec(), rng),
            None => Tensor::rand(shape.to_vec()),
        }
    }
}

fn run(plan: &ConvPlan, shapes: &ConvShapes, input: &Tensor, kernel: &Tensor, output: &mut [f32]) {
    match plan.kind {
        OperatorKind::StandardConv => conv2d(shapes, input, kernel, output),
        OperatorKind::DepthwiseConv => depthwise_conv2d(shapes, input, kernel, output),
    }
}

/// `O(n, m, h, w) = sum over c, kh, kw of I(n, c, h*S + kh, w*S + kw) * W(m, c, kh, kw)`
pub fn conv2d(shapes: &ConvShapes, input: &Tensor, kernel: &Tensor, output: &mut [f32]) {
    let (stride_h, stride_w) = shapes.stride;
    let output_shape = shapes.output_shape();

    for n in 0..shapes.batch {
        for m in 0..shapes.out_channels {
            for i in 0..shapes.out_height {
                for j in 0..shapes.out_width {
                    let mut value = 0.0;
                    for c in 0..shapes.channels {
                        for k_row in 0..shapes.kernel_height {
                            for k_col in 0..shapes.kernel_width {
                                let row = i * stride_h + k_row;
                                let col = j * stride_w + k_col;
                                value += input.data
                                    [util::index_4d_to_1d(&input.shape, n, c, row, col)]
                                    * kernel.data[util::index_4d_to_1d(
                                        &kernel.shape,
                                        m,
                                        c,
                                        k_row,
                                        k_col,
                                    )];
                            }
                        }
                    }
                    output[util::index_4d_to_1d(&output_shape, n, m, i, j)] = value;
                }
            }
        }
    }
}

/// One `KH x KW` filter per channel: `O(n, c, h, w) = sum over kh, kw of
/// I(n, c, h*S + kh, w*S + kw) * K(c, kh, kw)`.
pub fn depthwise_conv2d(shapes: &ConvShapes, input: &Tensor, kernel: &Tensor, output: &mut [f32]) {
    let (stride_h, stride_w) = shapes.stride;
    let output_shape = shapes.output_shape();
    let filter_len = shapes.kernel_height * shapes.kernel_width;

    for n in 0..shapes.batch {
        for c in 0..shapes.channels {
            let filter = &kernel.data[c * filter_len..(c + 1) * filter_len];
            for i in 0..shapes.out_height {
                for j in 0..shapes.out_width {
                    let mut value = 0.0;
                    for k_row in 0..shapes.kernel_height {
                        for k_col in 0..shapes.kernel_width {
                            let row = i * stride_h + k_row;
                            let col = j * stride_w + k_col;
                            value += input.data
                                [util::index_4d_to_1d(&input.shape, n, c, row, col)]
                                * filter[k_row * shapes.kernel_width + k_col];
                        }
                    }
                    output[util::index_4d_to_1d(&output_shape, n, c, i, j)] = value;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{KernelTemplate, ENTRY_POINT};

    #[test]
    fn handles_are_distinct() {
        let mut backend = CpuBackend::new(Some(1));
        let spec = KernelTemplate::convolution().instantiate(1).unwrap();
        let input = backend.make_tensor(&[1, 2, 4, 4]);
        let kernel = backend.make_tensor(&[1, 2, 3, 3]);

        let a = backend
            .compile(&spec, ENTRY_POINT, &[&input, &kernel], &MappingOptions::naive())
            .unwrap();
        let b = backend
            .compile(&spec, ENTRY_POINT, &[&input, &kernel], &MappingOptions::naive())
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(backend.kernel_count(), 2);
    }

    #[test]
    fn unknown_handle() {
        let mut backend = CpuBackend::default();
        let input = Tensor::zeros(vec![1, 1, 2, 2]);
        let kernel = Tensor::zeros(vec![1, 1, 1, 1]);
        let mut outputs = vec![Tensor::zeros(vec![1, 1, 2, 2])];

        assert!(matches!(
            backend.profile(KernelHandle(3), &[&input, &kernel], &mut outputs),
            Err(Error::UnknownHandle(3))
        ));
    }

    #[test]
    fn oversized_output_is_refused() {
        let mut backend = CpuBackend::default();
        let spec = KernelTemplate::convolution().instantiate(1).unwrap();
        // only the shapes are read when preparing outputs
        let input = Tensor {
            data: Vec::new(),
            shape: vec![1, 1, 1 << 15, 1 << 15],
        };
        let kernel = Tensor::zeros(vec![4, 1, 1, 1]);

        assert!(matches!(
            backend.prepare_outputs(&spec, ENTRY_POINT, &[&input, &kernel]),
            Err(Error::TooLarge { .. })
        ));
    }

    #[test]
    fn seeded_tensors_repeat() {
        let a = CpuBackend::new(Some(42)).make_tensor(&[2, 2]);
        let b = CpuBackend::new(Some(42)).make_tensor(&[2, 2]);

        assert_eq!(a, b);
    }
}
