//! # Error Types
//!
//! Two layers of errors flow through the crate:
//!
//! | Type | Produced by | Meaning |
//! |------|-------------|---------|
//! | [`ChainError`] | collaborators (wallet, contract, RPC) | transport or chain-level failure |
//! | [`ControlError`] | [`LifecycleController`](crate::LifecycleController) | why a request was abandoned or failed |
//!
//! `ControlError` messages are short and operator-facing; they are what
//! the notifier shows. `ChainError` detail is carried inside the
//! `ControlError` variants that wrap a collaborator failure.

use thiserror::Error;

// ════════════════════════════════════════════════════════════════════════════════
// CHAIN ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Failure reported by a wallet or contract collaborator.
///
/// Collaborators MUST NOT retry internally; each call maps to at most
/// one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Transport-level network failure.
    #[error("network error: {0}")]
    Network(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Node-provided message.
        message: String,
    },

    /// The call or transaction reverted on-chain.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The node answered, but the payload could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The operator declined to sign.
    #[error("signature request declined")]
    UserDeclined,

    /// No signing capability could be obtained for the session.
    #[error("no signer available: {0}")]
    NoSigner(String),

    /// The transaction disappeared from the mempool or was replaced.
    #[error("transaction dropped: {0}")]
    Dropped(String),
}

// ════════════════════════════════════════════════════════════════════════════════
// CONTROL ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Reasons a lifecycle request was abandoned or failed.
///
/// Validation variants (`NotConnected` through `FinalizeDeclined`) are
/// raised before anything is sent to the chain. `SignerUnavailable`,
/// `SubmissionFailed` and `ConfirmationFailed` wrap collaborator
/// failures after validation passed. `StatusReadFailed` is only ever
/// logged, never shown to the operator.
///
/// None of these leave local lifecycle state modified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    /// No wallet session.
    #[error("Connect a wallet first")]
    NotConnected,

    /// Connected to the wrong chain.
    #[error("Switch to the correct network first")]
    WrongNetwork,

    /// The connected account is not an administrator.
    #[error("Connected account is not authorized to manage the presale")]
    NotAuthorized,

    /// The presale is finalized; no transition is possible.
    #[error("Presale is already finalized")]
    AlreadyFinalized,

    /// The request does not apply to the current state.
    #[error("{0}")]
    PreconditionFailed(String),

    /// Another transition is still in flight.
    #[error("Another presale operation is still pending")]
    OperationPending,

    /// The separate finalize confirmation was refused.
    #[error("Finalization cancelled")]
    FinalizeDeclined,

    /// Signing capability could not be acquired.
    #[error("Signer unavailable: {0}")]
    SignerUnavailable(ChainError),

    /// Node rejected the transaction or the operator declined to sign.
    #[error("Transaction rejected: {0}")]
    SubmissionFailed(ChainError),

    /// Submitted, but did not confirm (reverted, dropped, timed out).
    #[error("Transaction failed to confirm: {0}")]
    ConfirmationFailed(String),

    /// A background status read failed.
    #[error("Status read failed: {0}")]
    StatusReadFailed(ChainError),
}

impl ControlError {
    /// Whether this error is shown to the operator.
    ///
    /// Status reads are best-effort; their failures are logged only.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ControlError::StatusReadFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_read_failures_are_silent() {
        let silent = ControlError::StatusReadFailed(ChainError::Network("down".into()));
        assert!(!silent.is_user_visible());

        for visible in [
            ControlError::NotConnected,
            ControlError::WrongNetwork,
            ControlError::OperationPending,
            ControlError::SubmissionFailed(ChainError::UserDeclined),
            ControlError::ConfirmationFailed("timed out".into()),
        ] {
            assert!(visible.is_user_visible(), "{:?}", visible);
        }
    }

    #[test]
    fn display_carries_collaborator_detail() {
        let err = ControlError::SubmissionFailed(ChainError::Rpc {
            code: -32000,
            message: "nonce too low".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("-32000"), "msg: {}", msg);
        assert!(msg.contains("nonce too low"), "msg: {}", msg);

        let err = ControlError::SignerUnavailable(ChainError::NoSigner("locked".into()));
        assert!(err.to_string().contains("locked"));
    }
}
