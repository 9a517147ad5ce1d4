use std::{fmt, str::FromStr, sync::Mutex};

use clap::ValueEnum;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    backend::{cpu::CpuBackend, cuda::CudaBackend, Backend},
    error::{Error, Result},
};

lazy_static! {
    static ref DEVICE: Mutex<Device> = Mutex::new(Device::from_env());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn from_env() -> Device {
        if std::env::var("CUDA").is_ok() {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }

    /// Creates the backend for this device. `seed` makes generated tensors
    /// reproducible.
    pub fn open(self, seed: Option<u64>) -> Result<Box<dyn Backend>> {
        info!("opening {} backend", self);
        match self {
            Device::Cpu => Ok(Box::new(CpuBackend::new(seed))),
            Device::Cuda => Ok(Box::new(CudaBackend::new(seed)?)),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Device> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(Error::InvalidConfig(format!("unknown device `{}`", other))),
        }
    }
}

pub fn get_device() -> Device {
    match DEVICE.lock() {
        Ok(device) => *device,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

pub fn set_device(device: Device) {
    match DEVICE.lock() {
        Ok(mut guard) => *guard = device,
        Err(poisoned) => *poisoned.into_inner() = device,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda);
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn set_then_get() {
        let before = get_device();
        set_device(Device::Cpu);

        assert_eq!(get_device(), Device::Cpu);
        set_device(before);
    }
}
