//! Process-local metric storage with Prometheus text exposition.
//!
//! Counters, gauges and histogram summaries keyed by name + labels, held in
//! bounded memory. Export is pull-based: [`MetricsRegistry::render`] produces
//! the text format served on `/metrics`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use vigil_core::CorrelationId;

/// Metric identity: name plus sorted label pairs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetricKey {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl MetricKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Stored value per key.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Histogram {
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct MetricPoint {
    pub value: MetricValue,
    /// Correlation id active at the most recent update, when enabled.
    pub correlation: Option<CorrelationId>,
}

pub(crate) struct MetricsRegistry {
    points: Mutex<BTreeMap<MetricKey, MetricPoint>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            points: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn increment(&self, key: MetricKey, by: u64, correlation: Option<CorrelationId>) {
        let mut points = self.points.lock().expect("metrics poisoned");
        let point = points.entry(key).or_insert(MetricPoint {
            value: MetricValue::Counter(0),
            correlation: None,
        });
        if let MetricValue::Counter(current) = &mut point.value {
            *current += by;
        }
        if correlation.is_some() {
            point.correlation = correlation;
        }
    }

    pub fn set_gauge(&self, key: MetricKey, value: f64, correlation: Option<CorrelationId>) {
        let mut points = self.points.lock().expect("metrics poisoned");
        points.insert(
            key,
            MetricPoint {
                value: MetricValue::Gauge(value),
                correlation,
            },
        );
    }

    pub fn record(&self, key: MetricKey, sample: f64, correlation: Option<CorrelationId>) {
        let mut points = self.points.lock().expect("metrics poisoned");
        let point = points.entry(key).or_insert(MetricPoint {
            value: MetricValue::Histogram {
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            correlation: None,
        });
        if let MetricValue::Histogram {
            count,
            sum,
            min,
            max,
        } = &mut point.value
        {
            *count += 1;
            *sum += sample;
            *min = min.min(sample);
            *max = max.max(sample);
        }
        if correlation.is_some() {
            point.correlation = correlation;
        }
    }

    pub fn snapshot(&self) -> Vec<(MetricKey, MetricValue)> {
        self.points
            .lock()
            .expect("metrics poisoned")
            .iter()
            .map(|(key, point)| (key.clone(), point.value.clone()))
            .collect()
    }

    /// Renders the text exposition: one `name{label="…"} value` line per
    /// sample, histograms as `_count`/`_sum` pairs.
    pub fn render(&self) -> String {
        let points = self.points.lock().expect("metrics poisoned");
        let mut out = String::new();
        for (key, point) in points.iter() {
            let labels = render_labels(&key.labels);
            match &point.value {
                MetricValue::Counter(value) => {
                    let _ = writeln!(out, "{}{} {}", key.name, labels, value);
                }
                MetricValue::Gauge(value) => {
                    let _ = writeln!(out, "{}{} {}", key.name, labels, value);
                }
                MetricValue::Histogram { count, sum, .. } => {
                    let _ = writeln!(out, "{}_count{} {}", key.name, labels, count);
                    let _ = writeln!(out, "{}_sum{} {}", key.name, labels, sum);
                }
            }
        }
        out
    }
}

fn render_labels(labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let body = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{body}}}")
}
