use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use convbench::{
    config::{Cli, Command, ListArgs, RunArgs, TraceArgs},
    harness::{self, Harness, RunSummary},
    report::{self, Report},
    trace::{self, Trace},
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let ok = match cli.command {
        Command::Run(args) => run(&args)?,
        Command::List(args) => list(&args)?,
        Command::Trace(args) => analyze(&args)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn run(args: &RunArgs) -> Result<bool> {
    let sampler = args.sampler()?;
    let catalog = args.catalog.load().context("loading layer catalog")?;
    let networks = catalog.select(&args.catalog.networks)?;

    let device = args.device();
    let backend = device
        .open(args.seed)
        .with_context(|| format!("opening {} backend", device))?;

    let mut harness = Harness::new(backend, Report::stdout())
        .with_sampler(sampler)
        .with_tuner(args.tuner());
    let summaries: Vec<RunSummary> = networks.into_iter().map(|n| harness.run(n)).collect();

    if let Some(path) = &args.json {
        report::write_json(path, &summaries)
            .with_context(|| format!("writing results to {:?}", path))?;
    }

    let ok = harness::exit_ok(&summaries);
    if ok {
        info!("all layers measured");
    } else {
        let failed: usize = summaries.iter().map(|s| s.failures.len()).sum();
        warn!("{} layer(s) failed", failed);
    }
    Ok(ok)
}

fn list(args: &ListArgs) -> Result<bool> {
    let catalog = args.catalog.load().context("loading layer catalog")?;
    let mut out = io::stdout().lock();

    for network in catalog.select(&args.catalog.networks)? {
        writeln!(
            out,
            "{} ({} layers, reported as {})",
            network.key,
            network.layers.len(),
            network.report_prefix
        )?;
        for layer in network {
            writeln!(
                out,
                "  {:<40} input {:?} kernel {:?} stride {}",
                layer.name, layer.input_shape, layer.kernel_shape, layer.stride
            )?;
        }
    }
    Ok(catalog.problems().is_empty())
}

fn analyze(args: &TraceArgs) -> Result<bool> {
    let trace = Trace::load(&args.file, &args.filter()?)
        .with_context(|| format!("reading trace {:?}", args.file))?;
    if trace.is_empty() {
        warn!("no events left in {:?}", args.file);
        return Ok(true);
    }

    let mut out = io::stdout().lock();
    trace::write_layers(
        &mut out,
        &trace.accumulate(),
        trace.covered_time(),
        args.mobilenet,
    )?;
    if args.summarize {
        trace::write_summary(&mut out, &trace)?;
    }
    Ok(true)
}
