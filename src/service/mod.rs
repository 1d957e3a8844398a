pub mod recovery;

pub use recovery::{RecoveryOutcome, RecoveryRequest, RecoveryService};
