// src/security/mod.rs
//! Secret handling: zeroizing buffers and redaction helpers for anything that might reach a log.

pub mod redaction;
pub mod secret;

pub use redaction::{redact_body, truncate_for_log};
pub use secret::{SecretString, SecretVec};
