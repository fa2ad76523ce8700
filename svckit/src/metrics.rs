use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec,
    Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref DATABASE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "database_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "database", "status"]
    ).unwrap();
    
    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "operations_total",
        "Total number of operations",
        &["operation", "status"]
    ).unwrap();
    
    pub static ref INDEX_CONVERGENCE: HistogramVec = register_histogram_vec!(
        "index_convergence_seconds",
        "Time between the last write and its visibility through the search index",
        &["outcome"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
}

pub fn record_operation(operation: &str, database: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    DATABASE_OPERATION_DURATION
        .with_label_values(&[operation, database, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_convergence(converged: bool, duration: f64) {
    let outcome = if converged { "indexed" } else { "timed_out" };
    INDEX_CONVERGENCE
        .with_label_values(&[outcome])
        .observe(duration);
}

/// Text exposition of every registered metric
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
