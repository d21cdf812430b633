// src/services/metrics.rs
//! Metrics registry: every series the service exports on `/metrics`.
//!
//! Each instance owns its own `prometheus::Registry`, so two registries (two
//! servers, or two tests) never share counters.
//!
//! | series                     | kind      | labels                          |
//! |----------------------------|-----------|---------------------------------|
//! | `submissions_total`        | counter   | status                          |
//! | `endpoint_requests_total`  | counter   | endpoint, method, status_code   |
//! | `request_latency_seconds`  | histogram | endpoint                        |
//! | `dream_processing_seconds` | summary   | -                               |
//! | `active_requests`          | gauge     | -                               |
//! | `archetype_distribution`   | gauge     | archetype                       |

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use prometheus::core::{Collector, Desc};
use prometheus::{
    proto, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::config::MetricsConfig;
use crate::services::reference::ReferenceTable;

/// Label that absorbs archetypes once the cardinality cap is reached.
pub const OVERFLOW_LABEL: &str = "other";

/// Status code recorded for requests dropped before a response existed.
pub const ABANDONED_STATUS: u16 = 499;

/// Method label for anything outside the standard verbs.
pub const OTHER_METHOD: &str = "other";

/// Fold an HTTP method onto a fixed label set. Extension methods are legal on
/// the wire and would otherwise mint a new series each.
pub fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "PATCH" => "PATCH",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        _ => OTHER_METHOD,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Success,
    Error,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Success => "success",
            SubmissionStatus::Error => "error",
        }
    }
}

pub struct MetricsRegistry {
    registry: Registry,
    submissions: IntCounterVec,
    endpoint_requests: IntCounterVec,
    request_latency: HistogramVec,
    processing: DurationSummary,
    active: IntGauge,
    distribution: IntGaugeVec,
    archetypes: LabelCap,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("active_requests", &self.active.get())
            .finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    pub fn new(cfg: &MetricsConfig) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let submissions = IntCounterVec::new(
            Opts::new("submissions_total", "Dream classification attempts by outcome"),
            &["status"],
        )?;
        let endpoint_requests = IntCounterVec::new(
            Opts::new("endpoint_requests_total", "Completed HTTP requests"),
            &["endpoint", "method", "status_code"],
        )?;
        let request_latency = HistogramVec::new(
            HistogramOpts::new(
                "request_latency_seconds",
                "Wall-clock duration of request handling",
            )
            .buckets(cfg.latency_buckets.clone()),
            &["endpoint"],
        )?;
        let processing = DurationSummary::new(
            "dream_processing_seconds",
            "Duration of the classification call",
        )?;
        let active = IntGauge::new("active_requests", "Requests currently in flight")?;
        let distribution = IntGaugeVec::new(
            Opts::new("archetype_distribution", "Dreams per archetype"),
            &["archetype"],
        )?;

        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(endpoint_requests.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;
        registry.register(Box::new(processing.clone()))?;
        registry.register(Box::new(active.clone()))?;
        registry.register(Box::new(distribution.clone()))?;

        // both outcomes are exported from the start, even at zero
        for status in [SubmissionStatus::Success, SubmissionStatus::Error] {
            submissions.with_label_values(&[status.as_str()]);
        }

        Ok(Self {
            registry,
            submissions,
            endpoint_requests,
            request_latency,
            processing,
            active,
            distribution,
            archetypes: LabelCap::new(cfg.max_extra_archetypes),
        })
    }

    /// Set `archetype_distribution` to the reference table counts. Seeded labels
    /// never count against the cardinality cap.
    pub fn seed_distribution(&self, table: &ReferenceTable) {
        for (label, count) in table.counts() {
            self.archetypes.admit_seeded(&label);
            self.distribution
                .with_label_values(&[label.as_str()])
                .set(count as i64);
        }
    }

    pub fn record_submission(&self, status: SubmissionStatus) {
        self.submissions.with_label_values(&[status.as_str()]).inc();
    }

    /// Bump the distribution gauge; returns the label actually used, which is
    /// [`OVERFLOW_LABEL`] once too many unseen archetypes have arrived.
    pub fn record_archetype(&self, archetype: &str) -> String {
        let label = self.archetypes.resolve(archetype);
        self.distribution.with_label_values(&[label.as_str()]).inc();
        label
    }

    pub fn observe_processing(&self, elapsed: Duration) {
        self.processing.observe(elapsed.as_secs_f64());
    }

    /// Request-boundary bookkeeping. `active_requests` goes up now and back
    /// down when the returned guard drops, on every exit path. `method` is
    /// folded through [`method_label`].
    pub fn begin_request(&self, endpoint: &str, method: &str) -> InFlightRequest<'_> {
        self.active.inc();
        InFlightRequest {
            metrics: self,
            endpoint: endpoint.to_string(),
            method: method_label(method),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Text exposition of every series.
    pub fn encode(&self) -> prometheus::Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    // ---------- read accessors ----------
    //
    // These read a collected snapshot; a label that was never recorded reads
    // as zero without creating a series.

    pub fn active_requests(&self) -> i64 {
        self.active.get()
    }

    pub fn submissions(&self, status: SubmissionStatus) -> u64 {
        sample(&self.submissions, &[("status", status.as_str())])
            .map_or(0, |m| m.get_counter().get_value() as u64)
    }

    pub fn archetype_count(&self, archetype: &str) -> i64 {
        sample(&self.distribution, &[("archetype", archetype)])
            .map_or(0, |m| m.get_gauge().get_value() as i64)
    }

    pub fn endpoint_requests(&self, endpoint: &str, method: &str, status_code: u16) -> u64 {
        let status_code = status_code.to_string();
        sample(
            &self.endpoint_requests,
            &[
                ("endpoint", endpoint),
                ("method", method_label(method)),
                ("status_code", status_code.as_str()),
            ],
        )
        .map_or(0, |m| m.get_counter().get_value() as u64)
    }

    pub fn latency_samples(&self, endpoint: &str) -> u64 {
        sample(&self.request_latency, &[("endpoint", endpoint)])
            .map_or(0, |m| m.get_histogram().get_sample_count())
    }

    pub fn processing_samples(&self) -> (u64, f64) {
        self.processing.snapshot()
    }

    fn complete(&self, endpoint: &str, method: &str, status_code: u16, elapsed: Duration) {
        self.endpoint_requests
            .with_label_values(&[endpoint, method, &status_code.to_string()])
            .inc();
        self.request_latency
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64());
    }
}

/// Guard returned by [`MetricsRegistry::begin_request`].
#[must_use = "dropping the guard immediately ends the request"]
pub struct InFlightRequest<'a> {
    metrics: &'a MetricsRegistry,
    endpoint: String,
    method: &'static str,
    started: Instant,
    finished: bool,
}

impl InFlightRequest<'_> {
    /// Record the final status; `active_requests` is released on drop.
    pub fn finish(mut self, status_code: u16) {
        self.record(status_code);
    }

    fn record(&mut self, status_code: u16) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.metrics
            .complete(&self.endpoint, self.method, status_code, self.started.elapsed());
    }
}

impl Drop for InFlightRequest<'_> {
    fn drop(&mut self) {
        self.record(ABANDONED_STATUS);
        self.metrics.active.dec();
    }
}

/// First collected sample whose labels include every `(name, value)` pair.
fn sample(collector: &dyn Collector, labels: &[(&str, &str)]) -> Option<proto::Metric> {
    let families = collector.collect();
    families
        .iter()
        .flat_map(|family| family.get_metric().iter())
        .find(|metric| {
            labels.iter().all(|(name, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
            })
        })
        .cloned()
}

// ---------- summary collector ----------

/// Count/sum summary. The prometheus crate only ships histograms, so this
/// exports the `SUMMARY` family by hand.
#[derive(Clone)]
struct DurationSummary {
    desc: Arc<Desc>,
    state: Arc<Mutex<(u64, f64)>>,
}

impl DurationSummary {
    fn new(name: &str, help: &str) -> prometheus::Result<Self> {
        let desc = Desc::new(name.to_string(), help.to_string(), vec![], HashMap::new())?;
        Ok(Self {
            desc: Arc::new(desc),
            state: Arc::new(Mutex::new((0, 0.0))),
        })
    }

    fn observe(&self, seconds: f64) {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        s.0 += 1;
        s.1 += seconds;
    }

    fn snapshot(&self) -> (u64, f64) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Collector for DurationSummary {
    fn desc(&self) -> Vec<&Desc> {
        vec![self.desc.as_ref()]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let (count, sum) = self.snapshot();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(count);
        summary.set_sample_sum(sum);

        let mut metric = proto::Metric::default();
        metric.set_summary(summary);

        let mut family = proto::MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);
        family.mut_metric().push(metric);
        vec![family]
    }
}

// ---------- label cardinality cap ----------

#[derive(Debug)]
struct LabelCap {
    max_extra: usize,
    inner: Mutex<LabelCapState>,
}

#[derive(Debug, Default)]
struct LabelCapState {
    seeded: BTreeSet<String>,
    extra: BTreeSet<String>,
}

impl LabelCap {
    fn new(max_extra: usize) -> Self {
        Self {
            max_extra,
            inner: Mutex::new(LabelCapState::default()),
        }
    }

    fn admit_seeded(&self, label: &str) {
        let mut s = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        s.extra.remove(label);
        s.seeded.insert(label.to_string());
    }

    fn resolve(&self, label: &str) -> String {
        let mut s = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if s.seeded.contains(label) || s.extra.contains(label) {
            return label.to_string();
        }
        if s.extra.len() < self.max_extra {
            s.extra.insert(label.to_string());
            return label.to_string();
        }
        tracing::debug!(label, "archetype label cap reached; counting as `other`");
        OVERFLOW_LABEL.to_string()
    }
}
