#![allow(dead_code)]

use std::iter::zip;

use convbench::{
    backend::{Backend, KernelHandle},
    options::MappingOptions,
    template::{KernelTemplate, ENTRY_POINT},
    tensor::Tensor,
};

pub fn assert_aprox_eq_vec(a: Vec<f32>, b: Vec<f32>, tolerance: f32) {
    assert_eq!(a.len(), b.len(), "length differs");
    for (a1, b1) in zip(a, b) {
        if a1.is_nan() {
            assert!(b1.is_nan());
        } else if b1.is_nan() {
            assert!(a1.is_nan());
        } else {
            assert!((a1 - b1).abs() < tolerance, "{} != {}", a1, b1);
        }
    }
}

/// Compiles `template` at `stride`, runs it once on `input` and `kernel` and
/// returns the output.
pub fn run_once(
    backend: &mut dyn Backend,
    template: KernelTemplate,
    stride: usize,
    input: &Tensor,
    kernel: &Tensor,
) -> Tensor {
    let spec = template.instantiate(stride).unwrap();
    let inputs = [input, kernel];
    let handle: KernelHandle = backend
        .compile(&spec, ENTRY_POINT, &inputs, &MappingOptions::naive())
        .unwrap();
    let mut outputs = backend.prepare_outputs(&spec, ENTRY_POINT, &inputs).unwrap();
    let info = backend.profile(handle, &inputs, &mut outputs).unwrap();
    assert!(info.kernel_runtime >= 0.0);

    outputs.remove(0)
}
