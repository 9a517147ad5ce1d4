mod util;

#[cfg(feature = "cuda")]
mod cuda {
    use convbench::{
        backend::{cpu::CpuBackend, cuda::CudaBackend, Backend},
        template::KernelTemplate,
    };

    use crate::util;

    #[test]
    fn conv2d_matches_cpu() {
        let mut cpu = CpuBackend::new(Some(9));
        let mut cuda = CudaBackend::new(None).unwrap();
        let input = cpu.make_tensor(&[1, 8, 30, 30]);
        let kernel = cpu.make_tensor(&[16, 8, 3, 3]);

        let expected = util::run_once(&mut cpu, KernelTemplate::convolution(), 2, &input, &kernel);
        let actual = util::run_once(&mut cuda, KernelTemplate::convolution(), 2, &input, &kernel);

        assert_eq!(actual.shape, expected.shape);
        util::assert_aprox_eq_vec(actual.data, expected.data, 1e-4);
    }

    #[test]
    fn depthwise_matches_cpu() {
        let mut cpu = CpuBackend::new(Some(10));
        let mut cuda = CudaBackend::new(None).unwrap();
        let input = cpu.make_tensor(&[1, 24, 58, 58]);
        let kernel = cpu.make_tensor(&[24, 3, 3]);

        let expected = util::run_once(&mut cpu, KernelTemplate::depthwise(), 1, &input, &kernel);
        let actual = util::run_once(&mut cuda, KernelTemplate::depthwise(), 1, &input, &kernel);

        assert_eq!(actual.shape, vec![1, 24, 56, 56]);
        util::assert_aprox_eq_vec(actual.data, expected.data, 1e-4);
    }

    #[test]
    fn workspace_grows_and_is_released() {
        let mut cpu = CpuBackend::new(Some(12));
        let small = [cpu.make_tensor(&[1, 4, 10, 10]), cpu.make_tensor(&[8, 4, 3, 3])];
        let large = [cpu.make_tensor(&[1, 4, 40, 40]), cpu.make_tensor(&[8, 4, 3, 3])];

        let mut cuda = CudaBackend::new(None).unwrap();
        util::run_once(&mut cuda, KernelTemplate::convolution(), 1, &small[0], &small[1]);
        let actual = util::run_once(&mut cuda, KernelTemplate::convolution(), 1, &large[0], &large[1]);
        drop(cuda);

        let expected = util::run_once(&mut cpu, KernelTemplate::convolution(), 1, &large[0], &large[1]);
        util::assert_aprox_eq_vec(actual.data, expected.data, 1e-4);

        let mut reopened = CudaBackend::new(None).unwrap();
        util::run_once(&mut reopened, KernelTemplate::convolution(), 1, &small[0], &small[1]);
    }
}

#[cfg(not(feature = "cuda"))]
mod cuda {
    use convbench::{device::Device, error::Error};

    #[test]
    fn unavailable_without_feature() {
        assert!(matches!(
            Device::Cuda.open(None),
            Err(Error::BackendUnavailable { .. })
        ));
    }
}
