//! Participant capability traits.
//!
//! Two capability tiers: volatile participants speak plain two-phase
//! commit, while the only durable participant additionally supports the
//! combined single-phase step.

use crate::context::TransactionContext;
use crate::response::{Enlistment, PreparingEnlistment, SinglePhaseEnlistment};
use async_trait::async_trait;

/// A resource manager driven by two-phase commit.
///
/// Exactly one response must be posted through the handle for every
/// notification received, either before the method returns or later from
/// another task. The coordinator behaves identically in both cases.
#[async_trait]
pub trait VolatileParticipant: Send + Sync {
    /// First-phase vote request.
    async fn prepare(&self, ctx: &TransactionContext, enlistment: PreparingEnlistment);

    /// Second-phase commit notification.
    async fn commit(&self, ctx: &TransactionContext, enlistment: Enlistment);

    /// Second-phase rollback notification.
    async fn rollback(&self, ctx: &TransactionContext, enlistment: Enlistment);
}

/// A durable resource manager that can combine both phases into one step.
///
/// A transaction holds at most one of these and always drives it through
/// [`SinglePhaseParticipant::single_phase_commit`] rather than the
/// two-phase pair.
#[async_trait]
pub trait SinglePhaseParticipant: VolatileParticipant {
    /// Combined prepare-and-commit request.
    async fn single_phase_commit(&self, ctx: &TransactionContext, enlistment: SinglePhaseEnlistment);
}
