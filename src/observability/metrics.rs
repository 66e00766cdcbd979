use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub match_runs_total: IntCounterVec,
    pub match_run_latency_seconds: HistogramVec,
    pub matches_created_total: IntCounter,
    pub unmatched_needs: IntGauge,
    pub claim_conflicts_total: IntCounter,
    pub donations_expired_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let match_runs_total = IntCounterVec::new(
            Opts::new("match_runs_total", "Total match runs by outcome"),
            &["outcome"],
        )
        .expect("valid match_runs_total metric");

        let match_run_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_run_latency_seconds",
                "Latency of a full match run in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_run_latency_seconds metric");

        let matches_created_total = IntCounter::new(
            "matches_created_total",
            "Matches produced and claimed across all runs",
        )
        .expect("valid matches_created_total metric");

        let unmatched_needs = IntGauge::new(
            "unmatched_needs",
            "Needs left unmatched or partially filled by the last run",
        )
        .expect("valid unmatched_needs metric");

        let claim_conflicts_total = IntCounter::new(
            "claim_conflicts_total",
            "Allocations dropped because the donation was claimed concurrently",
        )
        .expect("valid claim_conflicts_total metric");

        let donations_expired_total = IntCounter::new(
            "donations_expired_total",
            "Donations moved to EXPIRED by the sweeper",
        )
        .expect("valid donations_expired_total metric");

        registry
            .register(Box::new(match_runs_total.clone()))
            .expect("register match_runs_total");
        registry
            .register(Box::new(match_run_latency_seconds.clone()))
            .expect("register match_run_latency_seconds");
        registry
            .register(Box::new(matches_created_total.clone()))
            .expect("register matches_created_total");
        registry
            .register(Box::new(unmatched_needs.clone()))
            .expect("register unmatched_needs");
        registry
            .register(Box::new(claim_conflicts_total.clone()))
            .expect("register claim_conflicts_total");
        registry
            .register(Box::new(donations_expired_total.clone()))
            .expect("register donations_expired_total");

        Self {
            registry,
            match_runs_total,
            match_run_latency_seconds,
            matches_created_total,
            unmatched_needs,
            claim_conflicts_total,
            donations_expired_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
