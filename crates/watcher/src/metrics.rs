use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ALERTS_PROCESSED_TOTAL: IntCounter = register_int_counter!(
        "alertwatcher_processed_alerts_total",
        "Total number of alerts forwarded to the execution agent."
    )
    .unwrap();
    pub static ref ALERTS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        "alertwatcher_rejected_alerts_total",
        "Total number of alerts rejected as unsupported."
    )
    .unwrap();
    pub static ref ALERTS_BUFFERED_TOTAL: IntCounter = register_int_counter!(
        "alertwatcher_buffered_alerts_total",
        "Total number of alerts placed in the delivery buffer."
    )
    .unwrap();
    pub static ref ALERTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        "alertwatcher_delivered_alerts_total",
        "Total number of buffered alerts delivered on retry."
    )
    .unwrap();
    pub static ref ALERTS_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        "alertwatcher_exhausted_alerts_total",
        "Total number of buffered alerts that ran out of delivery attempts."
    )
    .unwrap();
}

pub fn register_metrics() {
    for counter in [
        &*ALERTS_PROCESSED_TOTAL,
        &*ALERTS_REJECTED_TOTAL,
        &*ALERTS_BUFFERED_TOTAL,
        &*ALERTS_DELIVERED_TOTAL,
        &*ALERTS_EXHAUSTED_TOTAL,
    ] {
        REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register metric");
    }
}

pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}
