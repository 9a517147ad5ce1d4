//! Hand-written direct convolution kernels in `resources/backend.cu`, timed
//! with CUDA events. Only functional with the `cuda` feature.

use rand::rngs::StdRng;

use crate::{
    error::{Error, Result},
    lang::Program,
    options::MappingOptions,
    tensor::Tensor,
};

use super::{Backend, KernelHandle, ProfilingInfo};

#[cfg(feature = "cuda")]
mod ffi {
    use std::os::raw::{c_char, c_int};

    /// Device buffers and timing events owned by one backend.
    #[repr(C)]
    pub struct Workspace {
        _private: [u8; 0],
    }

    extern "C" {
        pub fn cb_device_count(count: *mut c_int) -> c_int;
        pub fn cb_workspace_create(out: *mut *mut Workspace) -> c_int;
        pub fn cb_workspace_destroy(workspace: *mut Workspace);
        pub fn cb_conv2d(
            workspace: *mut Workspace,
            input: *const f32,
            kernel: *const f32,
            output: *mut f32,
            dims: *const c_int,
            depthwise: c_int,
            block: *const c_int,
            elapsed_ms: *mut f32,
        ) -> c_int;
        pub fn cb_error_string(code: c_int) -> *const c_char;
    }
}

pub struct CudaBackend {
    kernels: Vec<(Program, MappingOptions)>,
    rng: Option<StdRng>,
    #[cfg(feature = "cuda")]
    workspace: std::ptr::NonNull<ffi::Workspace>,
}

#[cfg(not(feature = "cuda"))]
impl CudaBackend {
    pub fn new(_seed: Option<u64>) -> Result<CudaBackend> {
        Err(Error::BackendUnavailable {
            device: "cuda".to_owned(),
            reason: "built without the `cuda` feature".to_owned(),
        })
    }
}

#[cfg(feature = "cuda")]
impl CudaBackend {
    pub fn new(seed: Option<u64>) -> Result<CudaBackend> {
        use rand::SeedableRng;

        let mut count = 0;
        check(unsafe { ffi::cb_device_count(&mut count) })?;
        if count == 0 {
            return Err(Error::BackendUnavailable {
                device: "cuda".to_owned(),
                reason: "no CUDA device found".to_owned(),
            });
        }
        tracing::info!("found {} CUDA device(s)", count);

        let mut workspace = std::ptr::null_mut();
        check(unsafe { ffi::cb_workspace_create(&mut workspace) })?;
        let workspace = std::ptr::NonNull::new(workspace).ok_or_else(|| Error::Cuda {
            code: -1,
            message: "workspace allocation returned null".to_owned(),
        })?;

        Ok(CudaBackend {
            kernels: Vec::new(),
            rng: seed.map(StdRng::seed_from_u64),
            workspace,
        })
    }
}

#[cfg(feature = "cuda")]
impl Drop for CudaBackend {
    fn drop(&mut self) {
        tracing::debug!("releasing CUDA workspace");
        unsafe { ffi::cb_workspace_destroy(self.workspace.as_ptr()) };
    }
}

#[cfg(feature = "cuda")]
fn check(code: std::os::raw::c_int) -> Result<()> {
    if code == 0 {
        return Ok(());
    }
    let message = unsafe {
        let ptr = ffi::cb_error_string(code);
        if ptr.is_null() {
            String::from("unknown error")
        } else {
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    };
    Err(Error::Cuda { code, message })
}

#[cfg(feature = "cuda")]
fn launch(
    workspace: std::ptr::NonNull<ffi::Workspace>,
    program: &Program,
    options: &MappingOptions,
    inputs: &[&Tensor],
    output: &mut Tensor,
) -> Result<f64> {
    use crate::layer::OperatorKind;

    let shapes = program.bind(&super::shapes_of(inputs))?;
    if output.numel() != shapes.output_len() {
        return Err(Error::ShapeMismatch {
            symbol: program.definition.outputs.join(","),
            message: format!("output must have shape {:?}", shapes.output_shape()),
        });
    }

    let dims = device_dims(&[
        shapes.batch,
        shapes.channels,
        shapes.height,
        shapes.width,
        shapes.out_channels,
        shapes.kernel_height,
        shapes.kernel_width,
        shapes.stride.0,
        shapes.stride.1,
    ])?;
    let block = [options.block[0] as i32, options.block[1] as i32];
    let depthwise = (program.plan.kind == OperatorKind::DepthwiseConv) as i32;

    let mut elapsed_ms = 0.0f32;
    check(unsafe {
        ffi::cb_conv2d(
            workspace.as_ptr(),
            inputs[0].data.as_ptr(),
            inputs[1].data.as_ptr(),
            output.data.as_mut_ptr(),
            dims.as_ptr(),
            depthwise,
            block.as_ptr(),
            &mut elapsed_ms,
        )
    })?;
    output.shape = shapes.output_shape();

    Ok(f64::from(elapsed_ms) * 1.0e3)
}

/// Converts shape dimensions to the `int`s the kernels take.
#[cfg_attr(not(feature = "cuda"), allow(dead_code))]
fn device_dims(dims: &[usize]) -> Result<Vec<i32>> {
    dims.iter()
        .map(|&d| {
            i32::try_from(d).map_err(|_| Error::ShapeMismatch {
                symbol: format!("{:?}", dims),
                message: format!("dimension {} does not fit a device int", d),
            })
        })
        .collect()
}

#[cfg(not(feature = "cuda"))]
fn launch(
    _program: &Program,
    _options: &MappingOptions,
    _inputs: &[&Tensor],
    _output: &mut Tensor,
) -> Result<f64> {
    Err(Error::BackendUnavailable {
        device: "cuda".to_owned(),
        reason: "built without the `cuda` feature".to_owned(),
    })
}

impl Backend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn compile(
        &mut self,
        spec: &str,
        entry: &str,
        inputs: &[&Tensor],
        options: &MappingOptions,
    ) -> Result<KernelHandle> {
        let program = crate::lang::compile(spec, entry)?;
        program.bind(&super::shapes_of(inputs))?;

        self.kernels.push((program, options.clone()));
        Ok(KernelHandle(self.kernels.len() - 1))
    }

    fn prepare_outputs(
        &mut self,
        spec: &str,
        entry: &str,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>> {
        let program = crate::lang::compile(spec, entry)?;
        let shapes = program.bind(&super::shapes_of(inputs))?;
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
        let (program, options) = self
            .kernels
            .get(handle.0)
            .ok_or(Error::UnknownHandle(handle.0))?;
        let output = outputs.first_mut().ok_or_else(|| Error::ShapeMismatch {
            symbol: program.definition.outputs.join(","),
            message: "no output tensor".to_owned(),
        })?;

        #[cfg(feature = "cuda")]
        let kernel_runtime = launch(self.workspace, program, options, inputs, output)?;
        #[cfg(not(feature = "cuda"))]
        let kernel_runtime = launch(program, options, inputs, output)?;
        Ok(ProfilingInfo { kernel_runtime })
    }

    fn make_tensor(&mut self, shape: &[usize]) -> Tensor {
        match &mut self.rng {
            Some(rng) => Tensor::rand_with(shape.to_vec(), rng),
            None => Tensor::rand(shape.to_vec()),
        }
    }
}
