use lazy_static::lazy_static;
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Crowd Monitor Metrics ====
    pub static ref CROWD_FRAMES_PROCESSED: IntCounter = {
        let metric = IntCounter::new(
            "crowd_frames_processed_total",
            "Total number of frames assessed",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_DETECTION_FAILURES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_detection_failures_total",
                "Frames whose detection failed and were counted as empty",
            ),
            &["plugin"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_CURRENT_COUNT: IntGauge = {
        let metric = IntGauge::new(
            "crowd_current_count",
            "People counted in the most recently assessed frame",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_OCCUPANCY_PERCENT: Gauge = {
        let metric = Gauge::new(
            "crowd_occupancy_percent",
            "Current count as a percentage of maximum capacity",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_ALERTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_alerts_total",
                "Alert evaluations by resulting status",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_CAPACITY: IntGaugeVec = {
        let metric = IntGaugeVec::new(
            Opts::new(
                "crowd_venue_capacity",
                "Capacity thresholds of the current venue",
            ),
            &["threshold"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Detector Metrics ====
    pub static ref DETECTOR_INFERENCES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detector_inferences_total",
                "Total number of detector inferences by execution provider",
            ),
            &["plugin", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DETECTOR_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "detector_inference_time_seconds",
                "Model inference time",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["plugin", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DETECTOR_PLUGIN_HEALTH: IntGaugeVec = {
        let metric = IntGaugeVec::new(
            Opts::new(
                "detector_plugin_health",
                "Detector plugin health (1 = healthy, 0 = unhealthy)",
            ),
            &["plugin"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
