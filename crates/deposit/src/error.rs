//! Error taxonomy for the deposit workflow.

use std::time::Duration;

use alloy_core::primitives::{Address, TxHash};

/// Convenience alias used across the crate.
pub type Result<T, E = DepositError> = std::result::Result<T, E>;

/// Everything that can go wrong before or during a deposit attempt.
///
/// Configuration and credential errors are raised before any network call.
/// Remote errors raised while the orchestrator is running are folded into a
/// [`crate::DepositReport`] instead of being returned raw.
#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    /// Missing or invalid setup (unknown network, absent RPC endpoint, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No usable signer for the requested mode.
    #[error("credential error: {0}")]
    Credential(String),

    /// A contract or account address is malformed.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The deposit request itself is unacceptable (e.g. zero amount).
    #[error("invalid deposit request: {0}")]
    InvalidRequest(String),

    /// The execution environment refused to let us act as `address`.
    #[error("impersonation of {address} refused: {reason}")]
    Impersonation { address: Address, reason: String },

    /// The node rejected or could not process a call. Covers JSON-RPC error
    /// responses, reverted executions and transport failures.
    #[error("remote call {method} failed: {message}")]
    RemoteCall { method: String, message: String },

    /// A bound handle was asked to call a method outside its interface.
    #[error("method {signature} is not part of the interface bound at {address}")]
    UnsupportedMethod {
        signature: &'static str,
        address: Address,
    },

    /// A submitted transaction was not observed as included in time.
    #[error("transaction {tx_hash} not included after {waited:?}")]
    Timeout { tx_hash: TxHash, waited: Duration },

    /// The node answered with something we could not interpret.
    #[error("unexpected response to {method}: {message}")]
    Unexpected { method: String, message: String },
}

impl DepositError {
    pub(crate) fn remote(method: &str, message: impl ToString) -> Self {
        Self::RemoteCall {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn unexpected(method: &str, message: impl ToString) -> Self {
        Self::Unexpected {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the error was raised before anything was sent to the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Credential(_)
                | Self::InvalidAddress { .. }
                | Self::InvalidRequest(_)
                | Self::UnsupportedMethod { .. }
        )
    }
}
