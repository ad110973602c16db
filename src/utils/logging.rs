//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Sync code is chatty (every debounce tick, every fetch). Modules that want to
//! silence it without touching `RUST_LOG` define the flag and use these macros
//! instead of calling `log` directly:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("hydrated {}", key);
//! ```
//!
//! The flag is resolved at the call site, so each module decides for itself.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors are always emitted when the module flag is on; local-cache failures
/// go through here and must stay visible.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
