#![allow(clippy::needless_range_loop)]
#![allow(clippy::len_zero)]
#![allow(clippy::doc_lazy_continuation)]
// src/lib.rs

pub mod blockchain;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod security;
pub mod service;

pub use crate::core::errors::RecoveryError;
pub use crate::service::{RecoveryOutcome, RecoveryRequest, RecoveryService};
