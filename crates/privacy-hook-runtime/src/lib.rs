//! Runtime side of privacy call redirection.
//!
//! Rewritten call sites land on [`PrivacyManager`] wrappers, which consult a
//! shared [`ConsentGate`] before touching the real platform accessor:
//!
//! ```ignore
//! let gate = ConsentGate::shared(ConsentConfig::default());
//! let privacy = PrivacyManager::new(Arc::clone(&gate));
//!
//! assert_eq!(privacy.last_known_location(&location_service, "gps"), None);
//! gate.grant_consent();
//! let fix = privacy.last_known_location(&location_service, "gps");
//! ```

pub mod gate;
pub mod metrics;
pub mod platform;
pub mod privacy_manager;

pub use gate::{CacheValue, ConsentConfig, ConsentGate, AUDIT_TARGET};
pub use metrics::{GateMetrics, GateMetricsSnapshot};
pub use privacy_manager::{keys, PrivacyManager};
