//! Per-run counters and gauges.
//!
//! A [`MetricsCollector`] is handed to the pipeline with
//! [`PipelineConfig::with_metrics`](crate::PipelineConfig::with_metrics). The pipeline
//! fills the counters named in [`names`] as it runs; callers can register their own
//! [`Metric`]s alongside them and export everything as JSON afterwards.
//!
//! ```no_run
//! use seer_ingest::metrics::{MetricsCollector, names};
//! use seer_ingest::{Pipeline, PipelineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! let pipeline = Pipeline::new(PipelineConfig::default().with_metrics(metrics.clone()));
//! pipeline.run_file("data/us.1990_2023.19ages.adjusted.txt")?;
//! println!("{:?}", metrics.counter(names::LINES_SKIPPED));
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Names of the metrics the pipeline records.
pub mod names {
    pub const LINES_PROCESSED: &str = "lines_processed";
    pub const LINES_SKIPPED: &str = "lines_skipped";
    pub const LINES_MALFORMED: &str = "lines_malformed";
    pub const LINES_PARSE_ERROR: &str = "lines_parse_error";
    pub const LINES_FILTERED_OUT: &str = "lines_filtered_out";
    pub const CHUNKS_EMITTED: &str = "chunks_emitted";
    /// Chunks whose filtered batch was empty.
    pub const CHUNKS_DROPPED: &str = "chunks_dropped";
    pub const ARTIFACTS_SPILLED: &str = "artifacts_spilled";
    pub const ROWS_OUTPUT: &str = "rows_output";
    /// Largest decoded chunk, in rows.
    pub const PEAK_CHUNK_ROWS: &str = "peak_chunk_rows";
}

/// A named value that can be exported.
pub trait Metric: Send + Sync + Any {
    fn name(&self) -> &str;

    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared, cloneable metric registry. Clones record into the same set of metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("metrics", &self.snapshot())
            .finish()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                metrics: HashMap::new(),
                start_time: None,
                end_time: None,
            })),
        }
    }

    // A panic while holding the lock cannot leave a metric half-written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a metric, replacing any with the same name.
    pub fn register(&self, metric: Box<dyn Metric>) {
        self.lock().metrics.insert(metric.name().to_string(), metric);
    }

    pub fn record_start(&self) {
        let mut inner = self.lock();
        inner.start_time = Some(Instant::now());
        inner.end_time = None;
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to a counter, creating it at zero first if needed.
    ///
    /// A non-counter metric registered under `name` is replaced.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.lock();
        if let Some(counter) = inner
            .metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<CounterMetric>())
        {
            counter.count += value;
            return;
        }
        inner.metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, value)),
        );
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.register(Box::new(CounterMetric::with_value(name, value)));
    }

    /// Current value of a counter, if one is registered under `name`.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock()
            .metrics
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<CounterMetric>())
            .map(|c| c.count)
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.register(Box::new(GaugeMetric::new(name, value)));
    }

    /// Raise a gauge to `value` if it is currently lower or absent.
    pub fn max_gauge(&self, name: &str, value: f64) {
        let mut inner = self.lock();
        if let Some(gauge) = inner
            .metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<GaugeMetric>())
        {
            gauge.value = gauge.value.max(value);
            return;
        }
        inner
            .metrics
            .insert(name.to_string(), Box::new(GaugeMetric::new(name, value)));
    }

    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.lock()
            .metrics
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<GaugeMetric>())
            .map(|g| g.value)
    }

    /// All metrics as `{name: {value, description?}}`, plus `execution_time_ms` once
    /// the run has ended.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut out = serde_json::Map::new();
        for (name, metric) in &inner.metrics {
            let mut entry = serde_json::Map::new();
            entry.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                entry.insert("description".to_string(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(entry));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            out.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": end.duration_since(start).as_millis(),
                    "description": "Wall-clock run time in milliseconds",
                }),
            );
        }
        Value::Object(out)
    }

    /// Write [`MetricsCollector::to_json`] to `path`, pretty-printed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Name to value, without descriptions or timing.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic count.
#[derive(Debug, Clone)]
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Single numeric reading.
#[derive(Debug, Clone)]
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
