pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod device;
pub mod error;
pub mod harness;
pub mod lang;
pub mod layer;
pub mod options;
pub mod report;
pub mod sampler;
pub mod template;
pub mod tensor;
pub mod trace;
pub mod util;

pub use error::{Error, Result};
