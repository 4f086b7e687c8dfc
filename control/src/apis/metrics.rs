//! Controller metrics
//!
//! Observer cycles, reconcile outcomes and rate limiter waits, all registered
//! on one registry served by the `/metrics` listener.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Controller metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// Observer cycles by result ("success" or an error kind)
    static ref OBSERVER_CYCLES_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_observer_cycles_total",
            "Total number of service/endpoint observer cycles",
        );
        let counter = IntCounterVec::new(opts, &["result"]).expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Services with at least one live endpoint in the last published snapshot
    static ref OBSERVER_SERVICES: IntGauge = {
        let gauge = IntGauge::new(
            "ingress_observer_services",
            "Services with live endpoints in the published snapshot",
        )
        .expect("Failed to create gauge");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(gauge.clone()))
            .expect("Failed to register gauge");
        gauge
    };

    /// Reconcile cycles by outcome
    static ref RECONCILE_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_reconcile_total",
            "Total number of reconcile cycles by outcome",
        );
        let counter = IntCounterVec::new(opts, &["outcome"]).expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Reconcile duration (render + reload when the config changed)
    static ref RECONCILE_DURATION: Histogram = {
        let opts = HistogramOpts::new(
            "ingress_reconcile_duration_seconds",
            "Reconcile cycle duration in seconds",
        );
        let histogram = Histogram::with_opts(opts).expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Consecutive failed render/reload attempts
    static ref RELOAD_CONSECUTIVE_FAILURES: IntGauge = {
        let gauge = IntGauge::new(
            "ingress_reload_consecutive_failures",
            "Consecutive failed render or reload attempts",
        )
        .expect("Failed to create gauge");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(gauge.clone()))
            .expect("Failed to register gauge");
        gauge
    };

    /// Seconds spent waiting for rate limiter admission
    static ref RATE_LIMITER_WAIT_SECONDS: CounterVec = {
        let opts = Opts::new(
            "ingress_rate_limiter_wait_seconds_total",
            "Total seconds each loop spent waiting for admission",
        );
        let counter = CounterVec::new(opts, &["limiter"]).expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record one observer cycle
pub fn record_observer_cycle(result: &str, services: Option<usize>) {
    OBSERVER_CYCLES_TOTAL.with_label_values(&[result]).inc();
    if let Some(services) = services {
        OBSERVER_SERVICES.set(services as i64);
    }
}

/// Record one reconcile cycle
pub fn record_reconcile(outcome: &str, duration_secs: f64) {
    RECONCILE_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILE_DURATION.observe(duration_secs);
}

pub fn set_reload_failures(failures: u32) {
    RELOAD_CONSECUTIVE_FAILURES.set(i64::from(failures));
}

pub fn record_rate_limiter_wait(limiter: &str, seconds: f64) {
    RATE_LIMITER_WAIT_SECONDS
        .with_label_values(&[limiter])
        .inc_by(seconds);
}

/// Gather controller metrics in the Prometheus text format
pub fn gather_controller_metrics() -> Result<String, String> {
    // Touch lazily-registered metrics so they show up before their first sample
    let _ = &*OBSERVER_CYCLES_TOTAL;
    let _ = &*OBSERVER_SERVICES;
    let _ = &*RECONCILE_TOTAL;
    let _ = &*RECONCILE_DURATION;
    let _ = &*RELOAD_CONSECUTIVE_FAILURES;
    let _ = &*RATE_LIMITER_WAIT_SECONDS;

    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
