//! Prometheus metrics recorder (ambient stack). Grounded on the teacher's
//! own `metrics_exporter_prometheus` setup; the buckets and counter/gauge
//! names are renamed from block-sync concerns to poll-cycle concerns
//! (spec 4.6.3's "agents queried, agents failed, records received,
//! summaries written" per-cycle counts, and 4.7's gap state transitions).

use std::time::Duration;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const POLL_CYCLE_SECONDS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full("poll_cycle_duration_seconds".to_string()), POLL_CYCLE_SECONDS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

#[derive(Clone)]
pub struct Metrics {
    pub prometheus_handle: PrometheusHandle,
}

impl Metrics {
    pub fn new(prometheus_handle: PrometheusHandle) -> Self {
        Self { prometheus_handle }
    }

    /// One poll cycle finished for `poller` (spec 4.6.3's per-cycle log line).
    pub fn record_poll_cycle(&self, poller: &'static str, duration: Duration, agents_queried: u64, agents_failed: u64, records_received: u64, summaries_written: u64) {
        metrics::histogram!("poll_cycle_duration_seconds", duration.as_secs_f64(), "poller" => poller);
        for _ in 0..agents_queried {
            metrics::increment_counter!("agents_queried_total", "poller" => poller);
        }
        for _ in 0..agents_failed {
            metrics::increment_counter!("agents_failed_total", "poller" => poller);
        }
        metrics::gauge!("records_received_last_cycle", records_received as f64, "poller" => poller);
        metrics::gauge!("summaries_written_last_cycle", summaries_written as f64, "poller" => poller);
    }

    pub fn record_gap_detected(&self, data_type: &'static str) {
        metrics::increment_counter!("gaps_detected_total", "data_type" => data_type);
    }

    pub fn record_gap_recovered(&self) {
        metrics::increment_counter!("gaps_recovered_total");
    }

    pub fn record_gap_permanent(&self) {
        metrics::increment_counter!("gaps_permanent_total");
    }
}
