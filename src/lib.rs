//! Privacy Hook
//!
//! Redirects calls to privacy-sensitive platform accessors in compiled
//! classes to consent-gated wrappers:
//!
//! - **Class files**: codec and in-place call patching ([`classfile`])
//! - **Build time**: collector and rewriter passes ([`transform`])
//! - **Run time**: consent gate, result cache and wrappers ([`runtime`])
//!
//! See [`config`] for the combined config file the `privacy-hook` CLI reads.

pub mod config;

pub use privacy_hook_classfile as classfile;
pub use privacy_hook_runtime as runtime;
pub use privacy_hook_transform as transform;

pub use config::PrivacyHookConfig;
