use std::sync::Arc;
use std::time::Duration;

use lessonload_http::{HttpClient, HttpRequest, HttpResponse};

use crate::Result;
use crate::checks::CheckTracker;
use crate::metrics::{MetricHandle, MetricsRegistry, ValueType};
use crate::sink::{PointSink, Tags};
use crate::thresholds::ThresholdSet;

#[derive(Debug)]
struct BuiltinMetrics {
    http_reqs: MetricHandle,
    http_req_duration: MetricHandle,
    http_req_failed: MetricHandle,
    data_sent: MetricHandle,
    data_received: MetricHandle,
    checks: MetricHandle,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    vus: MetricHandle,
    vus_max: MetricHandle,
}

impl BuiltinMetrics {
    fn register(registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            http_reqs: registry.counter("http_reqs", ValueType::Default)?,
            http_req_duration: registry.trend("http_req_duration", ValueType::Time)?,
            http_req_failed: registry.rate("http_req_failed")?,
            data_sent: registry.counter("data_sent", ValueType::Data)?,
            data_received: registry.counter("data_received", ValueType::Data)?,
            checks: registry.rate("checks")?,
            iterations: registry.counter("iterations", ValueType::Default)?,
            iteration_duration: registry.trend("iteration_duration", ValueType::Time)?,
            vus: registry.gauge("vus")?,
            vus_max: registry.gauge("vus_max")?,
        })
    }
}

/// Everything a workload touches during one run: the HTTP client, the run's metrics and the
/// check tallies.
#[derive(Debug)]
pub struct RunContext {
    client: HttpClient,
    registry: Arc<MetricsRegistry>,
    builtin: BuiltinMetrics,
    checks: CheckTracker,
}

impl RunContext {
    /// `sink` receives every metric declaration and point; `None` keeps results in memory only.
    pub fn new(
        client: HttpClient,
        sink: Option<PointSink>,
        thresholds: &[ThresholdSet],
    ) -> Result<Self> {
        let registry = Arc::new(MetricsRegistry::new(sink, thresholds));
        let builtin = BuiltinMetrics::register(&registry)?;
        Ok(Self {
            client,
            registry,
            builtin,
            checks: CheckTracker::default(),
        })
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn checks(&self) -> &CheckTracker {
        &self.checks
    }

    /// Sends `req` and records the built-in HTTP metrics for it. Any status >= 400 or transport
    /// error counts as a failed request.
    pub async fn http(
        &self,
        req: HttpRequest,
        tags: &Tags,
    ) -> lessonload_http::Result<HttpResponse> {
        let mut tags = tags.clone();
        tags.insert("method".to_string(), req.method.to_string());
        tags.insert("url".to_string(), req.url.clone());
        tags.entry("name".to_string())
            .or_insert_with(|| req.url.clone());

        let res = self.client.request(req).await;
        let m = &self.builtin;
        match &res {
            Ok(resp) => {
                let failed = resp.status >= 400;
                tags.insert("status".to_string(), resp.status.to_string());
                tags.insert("expected_response".to_string(), (!failed).to_string());

                m.http_reqs.add(1.0, &tags);
                m.http_req_duration.add(resp.duration_ms(), &tags);
                m.http_req_failed.add_bool(failed, &tags);
                m.data_sent.add(resp.bytes_sent as f64, &tags);
                m.data_received.add(resp.bytes_received as f64, &tags);
            }
            Err(err) => {
                tracing::debug!(error = %err, "request failed");
                tags.insert("status".to_string(), "0".to_string());
                tags.insert("error".to_string(), err.kind().to_string());
                tags.insert("expected_response".to_string(), "false".to_string());

                m.http_reqs.add(1.0, &tags);
                m.http_req_failed.add_bool(true, &tags);
            }
        }
        res
    }

    /// Records a named check and returns `passed` so callers can chain on it.
    pub fn check(&self, name: &str, passed: bool, tags: &Tags) -> bool {
        self.checks.record(name, passed);

        let mut tags = tags.clone();
        tags.insert("check".to_string(), name.to_string());
        self.builtin.checks.add_bool(passed, &tags);

        if !passed {
            tracing::debug!(check = name, "check failed");
        }
        passed
    }

    pub(crate) fn record_iteration(&self, elapsed: Duration, tags: &Tags) {
        self.builtin.iterations.add(1.0, tags);
        self.builtin
            .iteration_duration
            .add(elapsed.as_secs_f64() * 1000.0, tags);
    }

    pub(crate) fn record_vus(&self, active: u64) {
        self.builtin.vus.add(active as f64, &Tags::new());
    }

    pub(crate) fn record_vus_max(&self, max: u64) {
        self.builtin.vus_max.add(max as f64, &Tags::new());
    }
}

/// Tag set carrying only a `group` (k6-style `::Outer::Inner` path).
pub fn group_tags(group: &str) -> Tags {
    Tags::from([("group".to_string(), group.to_string())])
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::thresholds::ThresholdAgg;
    use crate::thresholds::Observe as _;

    #[tokio::test]
    async fn transport_errors_count_as_failed_requests() {
        let ctx = RunContext::new(HttpClient::default(), None, &[]).unwrap();

        let res = ctx
            .http(
                HttpRequest::get("http://127.0.0.1:9/unreachable")
                    .with_timeout(Duration::from_secs(2)),
                &group_tags("::probe"),
            )
            .await;
        assert!(res.is_err());

        let reg = ctx.registry();
        assert_eq!(reg.observe("http_reqs", ThresholdAgg::Count), Some(1.0));
        assert_eq!(reg.observe("http_req_failed", ThresholdAgg::Rate), Some(1.0));
        assert_eq!(reg.observe("http_req_duration", ThresholdAgg::Count), Some(0.0));
    }

    #[test]
    fn checks_feed_tracker_and_rate_metric() {
        let ctx = RunContext::new(HttpClient::default(), None, &[]).unwrap();
        let tags = group_tags("::Create Lesson");
        assert!(ctx.check("Lesson status 201", true, &tags));
        assert!(!ctx.check("Lesson title correct", false, &tags));

        assert_eq!(ctx.checks().failed_total(), 1);
        assert_eq!(
            ctx.registry().observe("checks", ThresholdAgg::Rate),
            Some(0.5)
        );
    }
}
