pub mod collaborators;
pub mod control;
pub mod controller;
pub mod error;
pub mod events;
pub mod relay;
pub mod runtime;
pub mod session_guard;
pub mod settings;
pub mod sync;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use controller::{DeviceController, DeviceView, ToggleOutcome};
pub use relay::{CommandDispatcher, RelayClient, RelayTimeouts, StatusPoller};
pub use session_guard::{GuardPhase, SessionGuard, SessionGuardConfig};
pub use sync::{Refresher, SyncConfig, SyncCoordinator, SyncOutcome};

/// State behind these mutexes stays consistent across a panic, so poisoning
/// is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
