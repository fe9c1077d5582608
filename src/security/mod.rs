// src/security/mod.rs
//! Safety layer: environment classification, the operation guard, memory hygiene and
//! error sanitising.

pub mod environment;
pub mod error_sanitizer;
pub mod guard;
pub mod memory_protection;

pub use environment::{EnvironmentCheck, EnvironmentClassifier, ExecutionContext};
pub use error_sanitizer::{sanitize_error_message, sanitize_for_logging};
pub use guard::{SafetyGuard, SensitiveOperation, Verdict};
pub use memory_protection::{secure_wipe, SecretBytes};
