use serde::Serialize;
use tracing::trace;

use crate::error::{Error, Result};

pub const DEFAULT_ITERATIONS: usize = 15;
pub const DEFAULT_WARMUP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSample {
    pub iteration: usize,
    pub microseconds: f64,
}

/// Averaged timing of one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerResult {
    pub name: String,
    pub average_microseconds: f64,
    pub sample_count: usize,
    pub samples: Vec<TimingSample>,
}

/// Runs a fixed number of profiling calls and averages the ones after the
/// warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSampler {
    total_iterations: usize,
    warmup_iterations: usize,
    profile_twice: bool,
}

impl Default for TimingSampler {
    fn default() -> Self {
        TimingSampler {
            total_iterations: DEFAULT_ITERATIONS,
            warmup_iterations: DEFAULT_WARMUP,
            profile_twice: false,
        }
    }
}

impl TimingSampler {
    pub fn new(total_iterations: usize, warmup_iterations: usize) -> Result<TimingSampler> {
        if total_iterations <= warmup_iterations {
            return Err(Error::InvalidConfig(format!(
                "iterations ({}) must exceed warm-up iterations ({})",
                total_iterations, warmup_iterations
            )));
        }
        Ok(TimingSampler {
            total_iterations,
            warmup_iterations,
            profile_twice: false,
        })
    }

    /// Discard one extra profiling call before each recorded one.
    pub fn profile_twice(mut self, enabled: bool) -> TimingSampler {
        self.profile_twice = enabled;
        self
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn warmup_iterations(&self) -> usize {
        self.warmup_iterations
    }

    pub fn measured_iterations(&self) -> usize {
        self.total_iterations - self.warmup_iterations
    }

    /// Calls `profile` once per iteration (twice when configured) and hands
    /// every recorded sample to `on_sample`, warm-up included. Stops at the
    /// first error of either.
    pub fn run<P, S>(&self, name: &str, mut profile: P, mut on_sample: S) -> Result<LayerResult>
    where
        P: FnMut() -> Result<f64>,
        S: FnMut(&TimingSample) -> Result<()>,
    {
        let mut samples = Vec::with_capacity(self.total_iterations);
        let mut sum = 0.0;

        for iteration in 0..self.total_iterations {
            if self.profile_twice {
                profile()?;
            }
            let sample = TimingSample {
                iteration,
                microseconds: profile()?,
            };
            trace!("{} round {}: {} us", name, iteration, sample.microseconds);

            if iteration >= self.warmup_iterations {
                sum += sample.microseconds;
            }
            on_sample(&sample)?;
            samples.push(sample);
        }

        Ok(LayerResult {
            name: name.to_owned(),
            average_microseconds: sum / self.measured_iterations() as f64,
            sample_count: self.measured_iterations(),
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_after_warmup() {
        let sampler = TimingSampler::default();
        let mut next = 0.0;
        let mut seen = Vec::new();

        let result = sampler
            .run(
                "layer",
                || {
                    next += 1.0;
                    Ok(next)
                },
                |s| {
                    seen.push(s.iteration);
                    Ok(())
                },
            )
            .unwrap();

        // samples 6..=15 are kept
        assert_eq!(result.average_microseconds, 10.5);
        assert_eq!(result.sample_count, 10);
        assert_eq!(result.samples.len(), 15);
        assert_eq!(seen, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn profile_twice_doubles_calls() {
        let sampler = TimingSampler::new(4, 1).unwrap().profile_twice(true);
        let mut calls = 0;

        let result = sampler
            .run(
                "layer",
                || {
                    calls += 1;
                    Ok(calls as f64)
                },
                |_| Ok(()),
            )
            .unwrap();

        assert_eq!(calls, 8);
        // recorded calls are 2, 4, 6, 8; the first is warm-up
        assert_eq!(result.average_microseconds, 6.0);
    }

    #[test]
    fn warmup_must_leave_samples() {
        assert!(TimingSampler::new(5, 5).is_err());
        assert!(TimingSampler::new(6, 5).is_ok());
    }

    #[test]
    fn stops_on_error() {
        let sampler = TimingSampler::default();
        let mut calls = 0;

        let result = sampler.run(
            "layer",
            || {
                calls += 1;
                if calls == 3 {
                    Err(Error::UnknownHandle(0))
                } else {
                    Ok(1.0)
                }
            },
            |_| Ok(()),
        );

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
