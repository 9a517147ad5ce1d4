use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    catalog::Catalog,
    device::{self, Device},
    error::Result,
    options::TunerConfig,
    sampler::{TimingSampler, DEFAULT_ITERATIONS, DEFAULT_WARMUP},
    trace::EventFilter,
};

/// Per-layer convolution latency benchmarks.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile and time every layer of the selected networks.
    Run(RunArgs),
    /// Print the layer catalog.
    List(ListArgs),
    /// Summarize per-layer times from a Chrome-trace JSON file.
    Trace(TraceArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    /// Networks to use, all of them when omitted.
    #[arg(long = "network", short = 'n')]
    pub networks: Vec<String>,

    /// JSON file with networks to use instead of the built-in catalog.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn load(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::from_json_file(path),
            None => Ok(Catalog::builtin()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Backend to run on. Defaults to cuda when `CUDA` is set, else cpu.
    #[arg(long, value_enum)]
    pub device: Option<Device>,

    /// Profiling calls per layer, warm-up included.
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Leading profiling calls left out of the average.
    #[arg(long, default_value_t = DEFAULT_WARMUP)]
    pub warmup: usize,

    /// Make a discarded profiling call before every recorded one.
    #[arg(long)]
    pub profile_twice: bool,

    /// Also write the results as JSON.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Seed for the random input tensors.
    #[arg(long, env = "CONVBENCH_SEED")]
    pub seed: Option<u64>,

    #[arg(long = "tuner_threads", default_value_t = 10)]
    pub tuner_threads: u32,

    #[arg(long = "tuner_gen_pop_size", default_value_t = 10)]
    pub tuner_gen_pop_size: u32,

    #[arg(long = "tuner_gen_generations", default_value_t = 3)]
    pub tuner_gen_generations: u32,

    #[arg(long = "tuner_gen_number_elites", default_value_t = 4)]
    pub tuner_gen_number_elites: u32,
}

impl RunArgs {
    pub fn device(&self) -> Device {
        self.device.unwrap_or_else(device::get_device)
    }

    pub fn sampler(&self) -> Result<TimingSampler> {
        Ok(TimingSampler::new(self.iterations, self.warmup)?.profile_twice(self.profile_twice))
    }

    pub fn tuner(&self) -> TunerConfig {
        TunerConfig {
            threads: self.tuner_threads,
            pop_size: self.tuner_gen_pop_size,
            generations: self.tuner_gen_generations,
            number_elites: self.tuner_gen_number_elites,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    /// Trace file to load.
    pub file: PathBuf,

    /// Only keep events whose name or type matches this regex.
    #[arg(long)]
    pub event: Option<String>,

    /// Keep runtime events.
    #[arg(long)]
    pub runtime: bool,

    /// Drop the first N kept events.
    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    /// Also print MobileNetV2 layer names.
    #[arg(long)]
    pub mobilenet: bool,

    /// Print total, covered and unattributed time.
    #[arg(long)]
    pub summarize: bool,
}

impl TraceArgs {
    pub fn filter(&self) -> Result<EventFilter> {
        let mut filter = match &self.event {
            Some(pattern) => EventFilter::with_pattern(pattern)?,
            None => EventFilter::default(),
        };
        filter.runtime = self.runtime;
        filter.skip = self.skip;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(["convbench", "run"].iter().chain(args)).unwrap();
        match cli.command {
            Command::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn run_defaults() {
        let args = run_args(&[]);
        let sampler = args.sampler().unwrap();

        assert!(args.catalog.networks.is_empty());
        assert_eq!(sampler.total_iterations(), 15);
        assert_eq!(sampler.warmup_iterations(), 5);
        assert_eq!(args.tuner(), TunerConfig::default());
    }

    #[test]
    fn run_flags() {
        let args = run_args(&[
            "--network",
            "resnet18",
            "-n",
            "mobilenet-0.75",
            "--device",
            "cpu",
            "--iterations",
            "3",
            "--warmup",
            "1",
            "--tuner_threads",
            "2",
        ]);

        assert_eq!(args.catalog.networks, vec!["resnet18", "mobilenet-0.75"]);
        assert_eq!(args.device(), Device::Cpu);
        assert_eq!(args.sampler().unwrap().measured_iterations(), 2);
        assert_eq!(args.tuner().threads, 2);
    }

    #[test]
    fn warmup_must_be_smaller() {
        assert!(run_args(&["--iterations", "5"]).sampler().is_err());
    }

    #[test]
    fn trace_filter() {
        let cli = Cli::try_parse_from([
            "convbench", "trace", "t.json", "--event", "conv", "--skip", "2",
        ])
        .unwrap();
        let Command::Trace(args) = cli.command else {
            panic!("expected trace");
        };
        let filter = args.filter().unwrap();

        assert_eq!(filter.skip, 2);
        assert!(filter.event.is_some());
    }
}
