//! The on-demand control loop.
//!
//! Two paths share one [`ExpiringStore`](ondemand_state::ExpiringStore):
//!
//! ```text
//! GET /?name=&timeout=
//!   └── Activator::activate()
//!         ├── lock_key(name)
//!         ├── cached started? → renew
//!         ├── else is_up? → started
//!         ├── else scale_up → starting
//!         └── put(name, record, timeout) → hooks
//!
//! sweep (every interval)
//!   └── IdleReaper::on_evict()
//!         ├── scale_down(name)
//!         └── hooks.on_scale_down / on_scale_down_error
//! ```
//!
//! Backend calls on both paths run under a bounded deadline.

pub mod activator;
pub mod duration;
pub mod error;
pub mod reaper;
pub mod request;

pub use activator::{Activator, DEFAULT_BACKEND_TIMEOUT};
pub use duration::{ParseDurationError, parse_duration};
pub use error::{ActivationError, ActivationResult, BackendOp};
pub use reaper::IdleReaper;
pub use request::ActivationRequest;
