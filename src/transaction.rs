//! Committable transaction: state machine and commit/rollback coordination.
//!
//! The transaction tracks its lifecycle state and the set of enlisted
//! participants, drives the two-phase voting protocol with a single-phase
//! step for the only durable participant, and fans terminal notifications
//! out to every participant once the outcome is decided.

use crate::context::TransactionContext;
use crate::error::{Result, TransactionError};
use crate::participant::{SinglePhaseParticipant, VolatileParticipant};
use crate::response::{
    self, Enlistment, PreparingEnlistment, ResponseCode, SinglePhaseEnlistment, TOD_ENLISTMENT_ID,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting enlistments, no termination started.
    Active,
    /// First-phase voting is in progress.
    Preparing,
    /// A rollback arrived while voting; the vote still quiesces before
    /// the transaction aborts.
    PrepareAborted,
    /// Votes are in; the outcome is being finalized.
    Finalizing,
    /// Terminal: all changes committed.
    Committed,
    /// Terminal: all changes rolled back.
    Aborted,
}

impl TransactionState {
    /// Whether the transaction reached a terminal state.
    pub fn is_terminated(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Whether the transaction is in the first-phase voting family.
    pub fn is_preparing(self) -> bool {
        matches!(self, Self::Preparing | Self::PrepareAborted)
    }
}

/// Enlistment and rollback surface of a transaction, as seen by
/// participants and ambient consumers.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Register the durable participant in one-and-only-one mode. Further
    /// durable enlistments are refused, and the registered participant is
    /// always driven through single-phase commit.
    ///
    /// Callable concurrently, and nested from within a participant's
    /// prepare callback.
    ///
    /// Returns [`TransactionError::IllegalState`] when a durable
    /// participant is already registered or the transaction status no
    /// longer admits enlistments.
    fn enlist_the_only_durable(&self, participant: Arc<dyn SinglePhaseParticipant>) -> Result<()>;

    /// Append a volatile participant.
    ///
    /// Callable concurrently, and nested from within a participant's
    /// prepare callback.
    ///
    /// Returns [`TransactionError::IllegalState`] when the transaction
    /// status no longer admits enlistments.
    fn enlist_volatile(&self, participant: Arc<dyn VolatileParticipant>) -> Result<()>;

    /// Roll back all changes.
    ///
    /// Blocks for the duration of the rollback except for the final
    /// response handling, which always runs concurrently and may finish
    /// after this call returns.
    ///
    /// Callable concurrently, and nested from within a participant's
    /// prepare callback.
    ///
    /// Returns `Ok(())` once rolled back, [`TransactionError::Aborted`] if
    /// the changes were already rolled back, and
    /// [`TransactionError::IllegalState`] if they were already committed.
    async fn rollback(&self, ctx: &TransactionContext) -> Result<()>;
}

/// Mutable transaction fields, guarded by the state lock.
struct TxState {
    status: TransactionState,
    /// The only durable participant.
    tod: Option<Arc<dyn SinglePhaseParticipant>>,
    volatiles: Vec<Arc<dyn VolatileParticipant>>,
}

impl TxState {
    fn is_empty(&self) -> bool {
        self.tod.is_none() && self.volatiles.is_empty()
    }

    fn clear(&mut self) {
        self.tod = None;
        self.volatiles = Vec::new();
    }
}

/// A local transaction whose changes can be committed.
///
/// Participants enlist while the transaction is active (or, nested, while
/// it is preparing); [`CommittableTransaction::commit`] then drives them
/// through the two-phase protocol, using single-phase commit for the only
/// durable participant when one is present.
pub struct CommittableTransaction {
    id: Uuid,

    /// State lock: guards status and the participant registry. Never held
    /// across a participant callback or a channel await.
    state: Mutex<TxState>,

    /// Control lock: serializes commit against non-reentrant rollback.
    /// Reentrant rollback during the prepare phase stays off this lock.
    control: AsyncMutex<()>,
}

impl CommittableTransaction {
    /// Create a new transaction in the active state.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(TxState {
                status: TransactionState::Active,
                tod: None,
                volatiles: Vec::new(),
            }),
            control: AsyncMutex::new(()),
        }
    }

    /// Transaction id, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state.lock().status
    }

    /// Commit all changes.
    ///
    /// Runs in stages: the two-phase prepare vote, a single-phase commit
    /// of the only durable participant when one is enlisted, and the
    /// terminal commit-or-rollback fan-out. Blocks until the outcome is
    /// decided; terminal responses are drained concurrently and may keep
    /// arriving after this call returns.
    ///
    /// Callable concurrently. During the prepare phase, nested
    /// [`Transaction::rollback`], [`Transaction::enlist_the_only_durable`]
    /// and [`Transaction::enlist_volatile`] calls are honored.
    ///
    /// Returns `Ok(())` once committed, [`TransactionError::Aborted`] if
    /// the changes were rolled back (now or earlier), and
    /// [`TransactionError::IllegalState`] if the transaction was already
    /// committed.
    pub async fn commit(&self, ctx: &TransactionContext) -> Result<()> {
        let _control = self.control.lock().await;

        let (mut working, mut tod) = {
            let mut state = self.state.lock();

            // The control lock excludes competing commits and rollbacks.
            debug_assert!(
                state.status.is_terminated() || state.status == TransactionState::Active
            );

            if state.status == TransactionState::Aborted {
                return Err(TransactionError::Aborted);
            }
            if state.status.is_terminated() {
                return Err(TransactionError::IllegalState);
            }
            if state.is_empty() {
                state.status = TransactionState::Committed;
                return Ok(());
            }

            state.status = TransactionState::Preparing;
            let working: Vec<Option<Arc<dyn VolatileParticipant>>> =
                state.volatiles.iter().cloned().map(Some).collect();
            (working, state.tod.clone())
        };

        tracing::debug!(
            "transaction {} preparing {} volatile participant(s)",
            self.id,
            working.len()
        );

        let (mut sender, mut receiver) = response::response_channel(working.len() + 1);
        let mut should_abort = false;
        let mut processed = 0;

        // Phase 1: prepare. Fan out to every unprocessed participant and
        // collect exactly as many responses, with no lock held. The
        // registry may grow underneath us through nested enlistments; each
        // pass picks up the new suffix until a pass observes no growth.
        loop {
            for (index, slot) in working.iter().enumerate().skip(processed) {
                if let Some(participant) = slot {
                    participant
                        .prepare(ctx, PreparingEnlistment::new(index as i64, sender.clone()))
                        .await;
                }
            }

            // On an abort vote, keep collecting: outstanding prepares must
            // quiesce before the terminal fan-out reuses the channel.
            while processed < working.len() {
                let resp = receiver
                    .recv()
                    .await
                    .expect("response channel closed while the coordinator holds a sender");
                match resp.code {
                    // Done during prepare waives the terminal notification.
                    ResponseCode::Done => working[resp.enlistment_id as usize] = None,
                    ResponseCode::Abort => should_abort = true,
                    ResponseCode::Commit => {}
                }
                processed += 1;
            }

            {
                let mut state = self.state.lock();

                // Pick up nested volatile enlistments; the channel is
                // replaced so its capacity covers the grown fan-out.
                if state.volatiles.len() > working.len() {
                    working.extend(state.volatiles[working.len()..].iter().cloned().map(Some));
                    (sender, receiver) = response::response_channel(working.len() + 1);
                }
                tod = state.tod.clone();

                // A nested rollback latched the prepare-aborted status.
                if state.status == TransactionState::PrepareAborted {
                    should_abort = true;
                }

                if should_abort || processed == working.len() {
                    // Leaving the prepare family and sealing the vote must
                    // be one critical section, or a reentrant rollback
                    // could slip in unseen between them.
                    state.status = TransactionState::Finalizing;
                    break;
                }
            }
        }

        // Phase 2a: single-phase commit of the only durable participant.
        if let Some(durable) = &tod
            && !should_abort
        {
            durable
                .single_phase_commit(
                    ctx,
                    SinglePhaseEnlistment::new(TOD_ENLISTMENT_ID, sender.clone()),
                )
                .await;

            let resp = receiver
                .recv()
                .await
                .expect("response channel closed while the coordinator holds a sender");
            if resp.code != ResponseCode::Commit {
                should_abort = true;
            }
        }

        // Phase 2b: publish the terminal status and release the registry;
        // the working set holds everything the fan-out still needs.
        {
            let mut state = self.state.lock();
            state.status = if should_abort {
                TransactionState::Aborted
            } else {
                TransactionState::Committed
            };
            state.clear();
        }

        let mut outstanding = 0;
        if should_abort && let Some(durable) = &tod {
            durable
                .rollback(ctx, Enlistment::new(TOD_ENLISTMENT_ID, sender.clone()))
                .await;
            outstanding += 1;
        }
        for (index, slot) in working.iter().enumerate() {
            let Some(participant) = slot else {
                continue;
            };
            let enlistment = Enlistment::new(index as i64, sender.clone());
            if should_abort {
                participant.rollback(ctx, enlistment).await;
            } else {
                participant.commit(ctx, enlistment).await;
            }
            outstanding += 1;
        }

        drop(sender);
        response::drain_in_background(receiver, outstanding);

        if should_abort {
            tracing::debug!("transaction {} aborted", self.id);
            Err(TransactionError::Aborted)
        } else {
            tracing::debug!("transaction {} committed", self.id);
            Ok(())
        }
    }
}

impl Default for CommittableTransaction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transaction for CommittableTransaction {
    fn enlist_the_only_durable(&self, participant: Arc<dyn SinglePhaseParticipant>) -> Result<()> {
        let mut state = self.state.lock();

        if state.tod.is_some() {
            return Err(TransactionError::IllegalState);
        }
        if !(state.status == TransactionState::Active || state.status.is_preparing()) {
            return Err(TransactionError::IllegalState);
        }
        state.tod = Some(participant);
        Ok(())
    }

    fn enlist_volatile(&self, participant: Arc<dyn VolatileParticipant>) -> Result<()> {
        let mut state = self.state.lock();

        if !(state.status == TransactionState::Active || state.status.is_preparing()) {
            return Err(TransactionError::IllegalState);
        }
        state.volatiles.push(participant);
        Ok(())
    }

    async fn rollback(&self, ctx: &TransactionContext) -> Result<()> {
        // Nested (and indistinguishable concurrent) rollback during the
        // prepare phase: latch the abort and stay off the control lock,
        // which the in-progress commit already holds.
        {
            let mut state = self.state.lock();
            if state.status.is_preparing() {
                state.status = TransactionState::PrepareAborted;
                tracing::debug!("transaction {} rollback latched during prepare", self.id);
                return Ok(());
            }
        }

        let _control = self.control.lock().await;

        let (tod, volatiles) = {
            let mut state = self.state.lock();

            // The control lock excludes competing commits and rollbacks.
            debug_assert!(
                state.status.is_terminated() || state.status == TransactionState::Active
            );

            if state.status == TransactionState::Aborted {
                return Err(TransactionError::Aborted);
            }
            if state.status.is_terminated() {
                return Err(TransactionError::IllegalState);
            }

            state.status = TransactionState::Aborted;
            (state.tod.take(), std::mem::take(&mut state.volatiles))
        };

        if tod.is_none() && volatiles.is_empty() {
            return Ok(());
        }

        let (sender, receiver) = response::response_channel(volatiles.len() + 1);
        let mut outstanding = 0;

        if let Some(durable) = &tod {
            durable
                .rollback(ctx, Enlistment::new(TOD_ENLISTMENT_ID, sender.clone()))
                .await;
            outstanding += 1;
        }
        for (index, participant) in volatiles.iter().enumerate() {
            participant
                .rollback(ctx, Enlistment::new(index as i64, sender.clone()))
                .await;
        }
        outstanding += volatiles.len();

        drop(sender);
        response::drain_in_background(receiver, outstanding);

        tracing::debug!(
            "transaction {} rolled back {} participant(s)",
            self.id,
            outstanding
        );
        Ok(())
    }
}
