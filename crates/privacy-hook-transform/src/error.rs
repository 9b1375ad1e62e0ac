//! Build-time error taxonomy.
//!
//! Both variants are fatal: they abort the pass that raised them. Call sites
//! without a matching rule are not errors and never surface here.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Marker metadata or a redirection rule that cannot be applied safely.
    Configuration {
        /// Internal name of the class being processed
        class: String,
        /// Method name (and descriptor where known), or the table entry
        method: String,
        reason: String,
    },

    /// Input that does not decode as a class file.
    MalformedClass {
        /// Path relative to the input root
        path: String,
        reason: String,
    },
}

impl TransformError {
    pub fn configuration(
        class: impl Into<String>,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TransformError::Configuration {
            class: class.into(),
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, TransformError::Configuration { .. })
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Configuration {
                class,
                method,
                reason,
            } => write!(f, "CONFIGURATION_ERROR in {}#{}: {}", class, method, reason),
            TransformError::MalformedClass { path, reason } => {
                write!(f, "MALFORMED_CLASS {}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for TransformError {}
