use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::app_context::AppContext;

#[derive(Clone)]
pub struct ServeState {
    pub app: Arc<AppContext>,
    pub health: Arc<ServeHealth>,
}

impl ServeState {
    pub fn new(app: Arc<AppContext>) -> Self {
        let health = Arc::new(ServeHealth::new());
        health.record_reload(app.acl_rules());
        Self { app, health }
    }

    pub fn health_snapshot(&self) -> ServeHealthSnapshot {
        self.health.snapshot()
    }

    pub fn mark_live(&self) {
        self.health.mark_live();
    }

    pub fn mark_ready(&self) {
        self.health.mark_ready();
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.health.mark_unready(error);
    }
}

#[derive(Debug)]
pub struct ServeHealth {
    started_at: DateTime<Utc>,
    live: AtomicBool,
    ready: AtomicBool,
    acl_rules: AtomicUsize,
    last_reload: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl Default for ServeHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ServeHealth {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            live: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            acl_rules: AtomicUsize::new(0),
            last_reload: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        *self.last_error.lock() = None;
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        *self.last_error.lock() = Some(error.into());
    }

    /// A successful ACL publish.
    pub fn record_reload(&self, rules: usize) {
        self.acl_rules.store(rules, Ordering::SeqCst);
        *self.last_reload.lock() = Some(Utc::now());
        *self.last_error.lock() = None;
    }

    /// A failed reload. The previous rules stay live, so readiness is kept.
    pub fn record_error(&self, error: impl Into<String>) {
        *self.last_error.lock() = Some(error.into());
    }

    pub fn snapshot(&self) -> ServeHealthSnapshot {
        ServeHealthSnapshot {
            started_at: self.started_at,
            live: self.live.load(Ordering::SeqCst),
            ready: self.ready.load(Ordering::SeqCst),
            acl_rules: self.acl_rules.load(Ordering::SeqCst),
            last_reload: *self.last_reload.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeHealthSnapshot {
    pub started_at: DateTime<Utc>,
    pub live: bool,
    pub ready: bool,
    pub acl_rules: usize,
    pub last_reload: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_reload_keeps_readiness() {
        let health = ServeHealth::new();
        health.mark_live();
        health.mark_ready();
        health.record_reload(4);
        health.record_error("bad predicate");
        let snapshot = health.snapshot();
        assert!(snapshot.ready);
        assert_eq!(snapshot.acl_rules, 4);
        assert_eq!(snapshot.last_error.as_deref(), Some("bad predicate"));

        health.record_reload(5);
        assert!(health.snapshot().last_error.is_none());
    }

    #[test]
    fn unready_records_the_reason() {
        let health = ServeHealth::new();
        health.mark_ready();
        health.mark_unready("draining");
        let snapshot = health.snapshot();
        assert!(!snapshot.ready);
        assert_eq!(snapshot.last_error.as_deref(), Some("draining"));
    }
}
