//! Domain types for activation tracking.

use serde::{Deserialize, Serialize};

/// Activation state of a workload as last decided by the activation handler.
///
/// `Started` is an advisory cache of the last observed truth; the scale
/// backend remains the source of truth for actual readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    /// A scale up was issued and the workload has not been observed up yet.
    Starting,
    /// The workload was observed running.
    Started,
    /// Anything else. Never produced by the activation handler itself.
    Unknown,
}

impl ActivationState {
    /// Every state, in exposition order.
    pub const ALL: [ActivationState; 3] = [Self::Starting, Self::Started, Self::Unknown];

    /// Lowercase label used in HTTP bodies and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value stored per workload name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub name: String,
    pub state: ActivationState,
}

impl ActivationRecord {
    pub fn new(name: impl Into<String>, state: ActivationState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}
