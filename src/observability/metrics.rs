use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub order_transitions_total: IntCounterVec,
    pub live_connections: IntGauge,
    pub notifications_total: IntCounterVec,
    pub dispatch_queue_depth: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of dispatch attempts in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Applied order transitions by target status"),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let live_connections =
            IntGauge::new("live_connections", "Participants with an open live connection")
                .expect("valid live_connections metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Routed frames by delivery channel"),
            &["channel"],
        )
        .expect("valid notifications_total metric");

        let dispatch_queue_depth =
            IntGauge::new("dispatch_queue_depth", "Orders waiting for automatic dispatch")
                .expect("valid dispatch_queue_depth metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(live_connections.clone()))
            .expect("register live_connections");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            order_transitions_total,
            live_connections,
            notifications_total,
            dispatch_queue_depth,
        }
    }

    pub fn record_notification(&self, channel: &str) {
        self.notifications_total.with_label_values(&[channel]).inc();
    }

    pub fn record_dispatch(&self, outcome: &str, elapsed_secs: f64) {
        self.assignments_total.with_label_values(&[outcome]).inc();
        self.assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
