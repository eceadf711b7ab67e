//! Ambient transaction carrier.
//!
//! Call chains thread a [`TransactionContext`] value through; the
//! coordinator forwards it to every participant notification, so nested
//! work can reach the transaction that is driving it.

use crate::transaction::Transaction;
use std::fmt;
use std::sync::Arc;

/// Value context carrying the current transaction through call chains.
///
/// Contexts are cheap to clone and derive; deriving never mutates the
/// parent.
#[derive(Clone, Default)]
pub struct TransactionContext {
    current: Option<Arc<dyn Transaction>>,
}

impl TransactionContext {
    /// Create a context with no current transaction.
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Derive a context with `transaction` as the current transaction.
    pub fn with_transaction(&self, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            current: Some(transaction),
        }
    }

    /// Derive a context with no current transaction.
    pub fn without_transaction(&self) -> Self {
        Self { current: None }
    }

    /// The current transaction, if any.
    pub fn current_transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.current.clone()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("has_transaction", &self.current.is_some())
            .finish()
    }
}
