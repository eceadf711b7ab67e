//! Transaction scopes: lexical brackets around a transaction lifetime.
//!
//! A scope binds a transaction to a stretch of work and settles it through
//! the complete/dispose pair: `complete` commits a transaction the scope
//! created, `dispose` rolls back anything left unsettled.

use crate::context::TransactionContext;
use crate::error::{Result, TransactionError};
use crate::transaction::{CommittableTransaction, Transaction};
use std::sync::Arc;

/// Policy selecting the transaction a scope binds to.
#[derive(Clone, Default)]
pub enum ScopePolicy {
    /// Bind to the ambient transaction if one is current, otherwise create
    /// a new committable transaction.
    #[default]
    Required,
    /// Always create a new committable transaction.
    RequiresNew,
    /// Bind to no transaction: the derived context carries none.
    Suppress,
    /// Attach an externally supplied transaction.
    Bound(Arc<dyn Transaction>),
}

/// Open a transaction scope over `ctx`.
///
/// Returns the derived context to run the scoped work under, together
/// with the scope's settlement handle.
pub fn with_transaction_scope(
    ctx: &TransactionContext,
    policy: ScopePolicy,
) -> (TransactionContext, TransactionScope) {
    match policy {
        ScopePolicy::Required => {
            if let Some(current) = ctx.current_transaction() {
                (ctx.clone(), TransactionScope::attached(current))
            } else {
                TransactionScope::owned(ctx)
            }
        }
        ScopePolicy::RequiresNew => TransactionScope::owned(ctx),
        ScopePolicy::Suppress => (
            ctx.without_transaction(),
            TransactionScope {
                kind: ScopeKind::Suppressed,
                terminated: false,
            },
        ),
        ScopePolicy::Bound(transaction) => (
            ctx.with_transaction(transaction.clone()),
            TransactionScope::attached(transaction),
        ),
    }
}

enum ScopeKind {
    /// The scope created the transaction and owns its settlement.
    Owned(Arc<CommittableTransaction>),
    /// The scope joined a transaction settled elsewhere.
    Attached(Arc<dyn Transaction>),
    /// The scope suppresses any ambient transaction.
    Suppressed,
}

/// Settlement handle for a transaction scope.
pub struct TransactionScope {
    kind: ScopeKind,
    terminated: bool,
}

impl TransactionScope {
    fn owned(ctx: &TransactionContext) -> (TransactionContext, TransactionScope) {
        let transaction = Arc::new(CommittableTransaction::new());
        let derived = ctx.with_transaction(transaction.clone());
        (
            derived,
            TransactionScope {
                kind: ScopeKind::Owned(transaction),
                terminated: false,
            },
        )
    }

    fn attached(transaction: Arc<dyn Transaction>) -> TransactionScope {
        TransactionScope {
            kind: ScopeKind::Attached(transaction),
            terminated: false,
        }
    }

    /// Settle the scope successfully: commit a scope-created transaction,
    /// or mark a joined or suppressed scope as complete.
    ///
    /// Returns [`TransactionError::InvalidOperation`] when the scope was
    /// already settled.
    pub async fn complete(&mut self) -> Result<()> {
        if self.terminated {
            return Err(TransactionError::InvalidOperation);
        }
        self.terminated = true;

        match &self.kind {
            ScopeKind::Owned(transaction) => transaction.commit(&TransactionContext::new()).await,
            ScopeKind::Attached(_) | ScopeKind::Suppressed => Ok(()),
        }
    }

    /// Settle the scope by rolling its transaction back, unless `complete`
    /// already ran. Safe to call unconditionally on every exit path.
    pub async fn dispose(&mut self) -> Result<()> {
        match &self.kind {
            ScopeKind::Suppressed => Ok(()),
            _ if self.terminated => Ok(()),
            ScopeKind::Owned(transaction) => {
                self.terminated = true;
                transaction.rollback(&TransactionContext::new()).await
            }
            ScopeKind::Attached(transaction) => {
                self.terminated = true;
                transaction.rollback(&TransactionContext::new()).await
            }
        }
    }
}
