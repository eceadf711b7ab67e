//! Error types for transactions and scopes.

use thiserror::Error;

/// Errors surfaced by transactions and transaction scopes.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A registry or terminal-call invariant was violated: enlisting after
    /// the transaction terminated, committing an already-committed
    /// transaction, or enlisting a second durable participant.
    #[error("transaction is in an illegal state")]
    IllegalState,

    /// The transaction ended in the aborted state, whether through a
    /// negative vote, a failed single-phase commit, a nested rollback, or
    /// an explicit rollback.
    #[error("transaction has been aborted")]
    Aborted,

    /// Scope-level misuse, such as completing a scope twice.
    #[error("invalid operation")]
    InvalidOperation,
}

impl TransactionError {
    /// Whether this error reports an illegal transaction state.
    ///
    /// [`TransactionError::Aborted`] is a refinement of
    /// [`TransactionError::IllegalState`], so both match.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState | Self::Aborted)
    }
}

/// Result type alias for transaction operations.
pub type Result<T> = std::result::Result<T, TransactionError>;
