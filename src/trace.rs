//! Per-layer timing analysis of Chrome-trace JSON files, as written by Glow's
//! runtime tracing.

use std::{collections::HashMap, fs, io::Write, path::Path};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{error::Result, util::format_us};

const RUNTIME_KIND: &str = "runtime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub name: String,
    pub kind: String,
    pub start: i64,
    pub end: i64,
    children: Vec<usize>,
    child_time: i64,
}

impl TraceEvent {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, start: i64, end: i64) -> Self {
        TraceEvent {
            name: name.into(),
            kind: kind.into(),
            start,
            end,
            children: Vec::new(),
            child_time: 0,
        }
    }

    pub fn duration(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    /// Time not spent in directly enclosed events.
    pub fn self_time(&self) -> i64 {
        self.duration().saturating_sub(self.child_time)
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    fn encloses(&self, other: &TraceEvent) -> bool {
        self.start <= other.start && self.end >= other.end
    }
}

/// Which events of a trace file to keep.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Keep only events whose name or kind matches at the start.
    pub event: Option<Regex>,
    /// Keep `runtime` events when no `event` pattern is given.
    pub runtime: bool,
    /// Drop this many events after the other filters.
    pub skip: usize,
}

impl EventFilter {
    pub fn with_pattern(pattern: &str) -> Result<EventFilter> {
        Ok(EventFilter {
            event: Some(Regex::new(&format!("^(?:{})", pattern))?),
            ..EventFilter::default()
        })
    }

    fn keeps(&self, name: &str, kind: &str) -> bool {
        match &self.event {
            Some(re) => re.is_match(name) || re.is_match(kind),
            None => self.runtime || kind != RUNTIME_KIND,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    name: Option<String>,
    #[serde(default)]
    ph: String,
    #[serde(default)]
    ts: Value,
    #[serde(default)]
    dur: Value,
    #[serde(default)]
    args: HashMap<String, Value>,
}

impl RawEvent {
    fn kind(&self) -> String {
        ["type", "kind"]
            .iter()
            .find_map(|key| self.args.get(*key))
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| RUNTIME_KIND.to_owned())
    }
}

fn micros(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    }
}

/// Events of one trace, nested so that every parent fully encloses its
/// children.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
    roots: Vec<usize>,
}

impl Trace {
    pub fn load(path: impl AsRef<Path>, filter: &EventFilter) -> Result<Trace> {
        let path = path.as_ref();
        info!("loading trace {:?}", path);
        Trace::from_json_str(&fs::read_to_string(path)?, filter)
    }

    pub fn from_json_str(json: &str, filter: &EventFilter) -> Result<Trace> {
        let raw_events: Vec<RawEvent> = serde_json::from_str(json)?;
        let mut skip = filter.skip;
        let mut events = Vec::new();
        let mut open: HashMap<String, TraceEvent> = HashMap::new();

        for raw in raw_events {
            let name = match &raw.name {
                Some(name) => name.clone(),
                None => continue,
            };
            let kind = raw.kind();
            if !filter.keeps(&name, &kind) {
                continue;
            }
            if skip > 0 {
                skip -= 1;
                continue;
            }

            let start = micros(&raw.ts);
            match raw.ph.as_str() {
                "X" => {
                    let end = start.saturating_add(micros(&raw.dur));
                    events.push(TraceEvent::new(name, kind, start, end));
                }
                "B" => {
                    open.insert(name.clone(), TraceEvent::new(name, kind, start, 0));
                }
                "E" => match open.remove(&name) {
                    Some(mut event) => {
                        event.end = start;
                        events.push(event);
                    }
                    None => debug!("end of `{}` without a begin", name),
                },
                _ => {}
            }
        }

        debug!("kept {} events, {} left open", events.len(), open.len());
        Ok(Trace::from_events(events))
    }

    pub fn from_events(events: Vec<TraceEvent>) -> Trace {
        let mut trace = Trace {
            events,
            roots: Vec::new(),
        };
        let ids = (0..trace.events.len()).collect();
        trace.roots = trace.stack(ids);
        trace
    }

    fn stack(&mut self, mut ids: Vec<usize>) -> Vec<usize> {
        // earliest first, the longer of two events starting together first
        ids.sort_by(|&a, &b| {
            let (a, b) = (&self.events[a], &self.events[b]);
            a.start.cmp(&b.start).then(b.end.cmp(&a.end))
        });

        let mut roots = Vec::new();
        let mut last: Option<usize> = None;
        for id in ids {
            if let Some(parent) = last {
                if self.events[parent].encloses(&self.events[id]) {
                    self.events[parent].children.push(id);
                    continue;
                }
                self.close(parent);
            }
            last = Some(id);
            roots.push(id);
        }
        if let Some(parent) = last {
            self.close(parent);
        }
        roots
    }

    fn close(&mut self, parent: usize) {
        let children = std::mem::take(&mut self.events[parent].children);
        if children.is_empty() {
            return;
        }
        let children = self.stack(children);
        let child_time = children
            .iter()
            .map(|&c| self.events[c].duration())
            .fold(0i64, i64::saturating_add);

        let event = &mut self.events[parent];
        event.children = children;
        event.child_time = child_time;
    }

    /// Events in load order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn roots(&self) -> impl Iterator<Item = &TraceEvent> {
        self.roots.iter().map(move |&id| &self.events[id])
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// From the start of the first top-level event to the end of the last.
    pub fn total_time(&self) -> i64 {
        match (self.roots.first(), self.roots.last()) {
            (Some(&first), Some(&last)) => {
                self.events[last].end.saturating_sub(self.events[first].start)
            }
            _ => 0,
        }
    }

    pub fn covered_time(&self) -> i64 {
        self.roots().map(TraceEvent::duration).fold(0, i64::saturating_add)
    }

    /// Self times of convolution events grouped by `"<name> (<kind>)"`, in
    /// first-seen order.
    pub fn accumulate(&self) -> Vec<LayerStats> {
        let mut order: Vec<String> = Vec::new();
        let mut times: HashMap<String, Vec<f64>> = HashMap::new();

        for event in self.events.iter().filter(|e| e.kind.contains("conv")) {
            let key = format!("{} ({})", event.name, event.kind);
            if !times.contains_key(&key) {
                order.push(key.clone());
            }
            times.entry(key).or_default().push(event.self_time() as f64);
        }

        order
            .into_iter()
            .map(|key| {
                let samples = times.remove(&key).unwrap_or_default();
                LayerStats::from_samples(key, &samples)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerStats {
    pub key: String,
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    pub total: f64,
}

impl LayerStats {
    fn from_samples(key: String, samples: &[f64]) -> LayerStats {
        let count = samples.len();
        let total: f64 = samples.iter().sum();
        let mean = if count == 0 { 0.0 } else { total / count as f64 };
        let variance = if count == 0 {
            0.0
        } else {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64
        };

        LayerStats {
            key,
            count,
            mean,
            stddev: variance.sqrt(),
            total,
        }
    }
}

/// Short MobileNetV2 layer name for a `"<name> (<kind>)"` key, e.g.
/// `b3_dwise` for the depthwise conv of the fourth bottleneck.
pub fn mobilenet_name(key: &str) -> Option<String> {
    let parts: Vec<&str> = key.split('_').collect();
    let block = *parts.get(2)?;

    if block.contains("linearbottleneck") {
        let suffix = match parts.get(3).copied() {
            Some("conv0") => "_expand",
            Some("conv1") => "_dwise",
            _ => "_linear",
        };
        Some(format!("b{}{}", block.replace("linearbottleneck", ""), suffix))
    } else {
        match block {
            "conv0" | "conv1" => Some(block.to_owned()),
            _ => Some("conv2".to_owned()),
        }
    }
}

pub fn write_layers<W: Write>(
    out: &mut W,
    layers: &[LayerStats],
    covered_time: i64,
    mobilenet: bool,
) -> Result<()> {
    for layer in layers {
        let percent = if covered_time > 0 {
            layer.total / covered_time as f64 * 100.0
        } else {
            0.0
        };
        writeln!(
            out,
            "{} {} events, mean: {}, stddev: {}, total: {} ({:.2}%)",
            layer.key,
            layer.count,
            format_us(layer.mean),
            format_us(layer.stddev),
            format_us(layer.total),
            percent
        )?;
    }

    if mobilenet {
        writeln!(out)?;
        writeln!(out)?;
        for layer in layers {
            let name = mobilenet_name(&layer.key).unwrap_or_else(|| layer.key.clone());
            writeln!(out, "{}, {}", name, format_us(layer.mean))?;
        }
    }
    Ok(())
}

pub fn write_summary<W: Write>(out: &mut W, trace: &Trace) -> Result<()> {
    let total = trace.total_time();
    let covered = trace.covered_time();

    writeln!(out, "Total time of trace: {}", format_us(total as f64))?;
    writeln!(out, "Time covered by events: {}", format_us(covered as f64))?;
    writeln!(out, "Unattributed time: {}", format_us(total.saturating_sub(covered) as f64))?;
    Ok(())
}
