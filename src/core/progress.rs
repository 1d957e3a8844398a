//! Progress reporting for long-running recoveries.
//!
//! The engine never writes to a UI directly; callers pass a [`ProgressReporter`]. Events carry
//! addresses and derivation descriptions only, never key material.

use bitcoin::Amount;
use tracing::{debug, info};

use crate::core::derivation::DerivationInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Status(String),
    AddressProbed {
        derivation: Vec<DerivationInfo>,
        address: String,
        index: u32,
        is_active: bool,
        balance: Amount,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status(message) => info!("{}", message),
            ProgressEvent::AddressProbed { derivation, address, index, is_active: true, balance } => {
                let paths: Vec<String> = derivation.iter().map(ToString::to_string).collect();
                info!(%address, index, %balance, derivation = ?paths, "Address is active");
            }
            ProgressEvent::AddressProbed { address, index, .. } => {
                debug!(%address, index, "Address unused");
            }
        }
    }
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}
