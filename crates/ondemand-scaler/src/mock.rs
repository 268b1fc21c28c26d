//! In-memory scale backend that records every call.
//!
//! Used by tests across the workspace and by `--provider mock` for local
//! experimentation without a container runtime.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::backend::ScaleBackend;
use crate::error::{ScalerError, ScalerResult};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleCall {
    ScaleUp(String),
    ScaleDown(String),
    IsUp(String),
}

#[derive(Default)]
struct Failures {
    scale_up: HashSet<String>,
    scale_down: HashSet<String>,
    is_up: HashSet<String>,
}

/// Mock backend with configurable readiness and injected failures.
#[derive(Default)]
pub struct MockScaler {
    up: Mutex<HashMap<String, bool>>,
    failures: Mutex<Failures>,
    calls: Mutex<Vec<ScaleCall>>,
    /// When set, `scale_up` marks the workload ready immediately.
    instant_start: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose workloads become ready as soon as they are scaled up.
    pub fn instant() -> Self {
        let mock = Self::default();
        mock.instant_start.store(true, Ordering::Relaxed);
        mock
    }

    pub fn set_up(&self, name: &str, up: bool) {
        lock(&self.up).insert(name.to_string(), up);
    }

    pub fn fail_scale_up(&self, name: &str, fail: bool) {
        toggle(&mut lock(&self.failures).scale_up, name, fail);
    }

    pub fn fail_scale_down(&self, name: &str, fail: bool) {
        toggle(&mut lock(&self.failures).scale_down, name, fail);
    }

    pub fn fail_is_up(&self, name: &str, fail: bool) {
        toggle(&mut lock(&self.failures).is_up, name, fail);
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<ScaleCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &ScaleCall) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: ScaleCall) {
        debug!(?call, "mock backend call");
        lock(&self.calls).push(call);
    }

    fn injected(name: &str, op: &str) -> ScalerError {
        ScalerError::Api {
            name: name.to_string(),
            status: 500,
            message: format!("injected {op} failure"),
        }
    }
}

fn toggle(set: &mut HashSet<String>, name: &str, on: bool) {
    if on {
        set.insert(name.to_string());
    } else {
        set.remove(name);
    }
}

#[async_trait]
impl ScaleBackend for MockScaler {
    async fn scale_up(&self, name: &str) -> ScalerResult<()> {
        self.record(ScaleCall::ScaleUp(name.to_string()));
        if lock(&self.failures).scale_up.contains(name) {
            return Err(Self::injected(name, "scale up"));
        }
        if self.instant_start.load(Ordering::Relaxed) {
            self.set_up(name, true);
        }
        Ok(())
    }

    async fn scale_down(&self, name: &str) -> ScalerResult<()> {
        self.record(ScaleCall::ScaleDown(name.to_string()));
        if lock(&self.failures).scale_down.contains(name) {
            return Err(Self::injected(name, "scale down"));
        }
        self.set_up(name, false);
        Ok(())
    }

    async fn is_up(&self, name: &str) -> ScalerResult<bool> {
        self.record(ScaleCall::IsUp(name.to_string()));
        if lock(&self.failures).is_up.contains(name) {
            return Err(Self::injected(name, "is up"));
        }
        Ok(lock(&self.up).get(name).copied().unwrap_or(false))
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}
