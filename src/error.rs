//! Typed provisioning errors.
//!
//! All variants implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Provider-operation failures travel as plain
//! `anyhow` errors with context attached at the call site; only the
//! failures the orchestrator and tests must discriminate get a variant here.

use thiserror::Error;

/// Fatal failures raised by the orchestrator and its polling loops.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A bounded-retry loop spent its whole time budget.
    #[error("Timeout waiting for {purpose} after {attempts} attempts")]
    DeadlineExceeded { purpose: String, attempts: u32 },

    /// No candidate login produced a live SSH session.
    ///
    /// Carries the deadline expiry as its source when the poll timed out;
    /// when every candidate was rejected outright there is no source.
    #[error("Unable to log in to {address} via SSH (tried: {tried})")]
    UnreachableHost {
        address: String,
        tried: String,
        #[source]
        source: Option<Box<ProvisionError>>,
    },

    /// The configuration-management runner exited non-zero.
    #[error("Ansible runner failed with status {status}")]
    BootstrapRunnerFailed { status: i32 },
}
