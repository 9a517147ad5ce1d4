use std::{collections::HashMap, fmt, io::Write};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    backend::Backend,
    cache::{CompilationCache, VariantKey},
    error::Result,
    layer::{LayerSpec, Network},
    options::{self, MappingOptions, TunerConfig},
    report::Report,
    sampler::{LayerResult, TimingSampler},
    template::{KernelTemplate, ENTRY_POINT},
    tensor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ParametrizingTemplates,
    CompilingVariants,
    MeasuringLayer,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::ParametrizingTemplates => "parametrizing templates",
            Stage::CompilingVariants => "compiling variants",
            Stage::MeasuringLayer => "measuring layer",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A layer whose failure boundary caught an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerFailure {
    pub name: String,
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub network: String,
    pub results: Vec<LayerResult>,
    pub failures: Vec<LayerFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Whether a run over `summaries` should exit with status 0.
pub fn exit_ok(summaries: &[RunSummary]) -> bool {
    summaries.iter().all(RunSummary::is_success)
}

/// An instantiated variant, or why it could not be instantiated.
struct Variant {
    text: std::result::Result<String, String>,
    options: MappingOptions,
}

/// Drives one network at a time through template instantiation, lazy
/// compilation and per-layer measurement.
pub struct Harness<W: Write> {
    backend: Box<dyn Backend>,
    report: Report<W>,
    sampler: TimingSampler,
    tuner: TunerConfig,
    stage: Stage,
}

impl<W: Write> Harness<W> {
    pub fn new(backend: Box<dyn Backend>, report: Report<W>) -> Harness<W> {
        Harness {
            backend,
            report,
            sampler: TimingSampler::default(),
            tuner: TunerConfig::default(),
            stage: Stage::Idle,
        }
    }

    pub fn with_sampler(mut self, sampler: TimingSampler) -> Harness<W> {
        self.sampler = sampler;
        self
    }

    pub fn with_tuner(mut self, tuner: TunerConfig) -> Harness<W> {
        self.tuner = tuner;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn into_report(self) -> Report<W> {
        self.report
    }

    /// Measures every layer of `network` in catalog order. Layer errors are
    /// reported and collected; they never stop the run.
    pub fn run(&mut self, network: &Network) -> RunSummary {
        info!(
            "benchmarking {} layers of {} on {}",
            network.layers.len(),
            network.key,
            self.backend.name()
        );

        self.stage = Stage::ParametrizingTemplates;
        let mut variants: HashMap<VariantKey, Variant> = HashMap::new();
        for (kind, stride) in network.variants() {
            let text = KernelTemplate::for_kind(kind)
                .instantiate(stride)
                .map_err(|e| e.to_string());
            if let Err(message) = &text {
                warn!("{} stride {}: {}", kind, stride, message);
            }
            variants.insert(
                (kind, stride),
                Variant {
                    text,
                    options: MappingOptions::naive(),
                },
            );
        }

        self.stage = Stage::CompilingVariants;
        for ((kind, stride), variant) in variants.iter_mut() {
            if let Ok(text) = &variant.text {
                variant.options = options::best_options(*kind, text, &self.tuner);
                debug!("{} stride {} uses {:?}", kind, stride, variant.options);
            }
        }

        let mut cache = CompilationCache::new();
        let mut summary = RunSummary {
            network: network.key.clone(),
            results: Vec::new(),
            failures: Vec::new(),
        };

        for layer in network {
            self.stage = Stage::MeasuringLayer;
            let variant = &variants[&(layer.operator_kind, layer.stride)];
            let outcome = match &variant.text {
                Ok(text) => self
                    .measure_layer(&network.report_prefix, layer, text, &variant.options, &mut cache)
                    .map_err(|e| (Stage::MeasuringLayer, e.to_string())),
                Err(message) => Err((Stage::ParametrizingTemplates, message.clone())),
            };

            match outcome {
                Ok(result) => summary.results.push(result),
                Err((stage, message)) => {
                    error!("{}/{} failed: {}", network.report_prefix, layer.name, message);
                    if let Err(e) = self.report.error(&network.report_prefix, &layer.name, &message) {
                        warn!("could not report failure of {}: {}", layer.name, e);
                    }
                    summary.failures.push(LayerFailure {
                        name: layer.name.clone(),
                        stage,
                        message,
                    });
                }
            }
        }

        self.stage = Stage::Done;
        info!(
            "{}: {} measured, {} failed, {} kernels compiled ({} cache hits)",
            network.key,
            summary.results.len(),
            summary.failures.len(),
            cache.misses(),
            cache.hits()
        );
        summary
    }

    fn measure_layer(
        &mut self,
        prefix: &str,
        layer: &LayerSpec,
        spec: &str,
        options: &MappingOptions,
        cache: &mut CompilationCache,
    ) -> Result<LayerResult> {
        debug!("measuring {}", layer.name);

        tensor::checked_numel(&layer.input_shape)?;
        tensor::checked_numel(&layer.kernel_shape)?;
        let input = self.backend.make_tensor(&layer.input_shape);
        let kernel = self.backend.make_tensor(&layer.kernel_shape);
        let inputs = [&input, &kernel];

        let backend = &mut self.backend;
        let handle = cache.get_or_compile((layer.operator_kind, layer.stride), || {
            backend.compile(spec, ENTRY_POINT, &inputs, options)
        })?;
        let mut outputs = backend.prepare_outputs(spec, ENTRY_POINT, &inputs)?;

        let report = &mut self.report;
        let result = self.sampler.run(
            &layer.name,
            || Ok(backend.profile(handle, &inputs, &mut outputs)?.kernel_runtime),
            |sample| report.round(prefix, &layer.name, sample),
        )?;
        report.time(prefix, &layer.name, result.average_microseconds)?;

        Ok(result)
    }
}
