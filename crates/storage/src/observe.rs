use std::time::{Duration, Instant};

/// Times one store call and reports it on `finish`.
pub struct OperationGuard {
    op: &'static str,
    target: Option<String>,
    start: Instant,
}

impl OperationGuard {
    pub fn new(op: &'static str, target: Option<&str>) -> Self {
        OperationGuard {
            op,
            target: target.map(|t| t.to_string()),
            start: Instant::now(),
        }
    }

    pub fn finish(self, rows: usize, code: Option<i32>) {
        record(self.op, self.target.as_deref(), self.start.elapsed(), rows, code);
    }
}

pub fn operation(op: &'static str, target: Option<&str>) -> OperationGuard {
    OperationGuard::new(op, target)
}

pub fn record(op: &'static str, target: Option<&str>, latency: Duration, rows: usize, code: Option<i32>) {
    #[cfg(feature = "observe")]
    tracing::debug!(
        target: "docgate::storage",
        op,
        target_ns = target.unwrap_or("-"),
        latency_ms = latency.as_millis() as u64,
        rows,
        native_code = code,
        "storage operation"
    );

    #[cfg(not(feature = "observe"))]
    let _ = (op, target, latency, rows, code);
}
