//! Hook interface called by the control loop.

use std::time::Duration;

use ondemand_state::ActivationState;

/// Receives activation lifecycle notifications.
///
/// Calls are synchronous and fire-and-forget. Implementations must be
/// cheap and must not block.
pub trait ObservabilityHooks: Send + Sync {
    /// The activation handler decided `state` for `name`.
    fn on_state_change(&self, name: &str, state: ActivationState);

    /// The idle timeout of `name` was (re)set to `timeout`.
    fn on_timeout_set(&self, name: &str, timeout: Duration);

    /// `name` expired and was scaled down.
    fn on_scale_down(&self, name: &str);

    /// `name` expired but the scale down failed.
    fn on_scale_down_error(&self, name: &str);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ObservabilityHooks for NoopHooks {
    fn on_state_change(&self, _name: &str, _state: ActivationState) {}
    fn on_timeout_set(&self, _name: &str, _timeout: Duration) {}
    fn on_scale_down(&self, _name: &str) {}
    fn on_scale_down_error(&self, _name: &str) {}
}
