//! Hand-rolled mock participants shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use local_2pc::{
    Enlistment, PreparingEnlistment, Result, SinglePhaseEnlistment, SinglePhaseParticipant,
    Transaction, TransactionContext, VolatileParticipant,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered record of participant callbacks across a whole scenario.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Panic unless `earlier` was recorded before `later`.
    pub fn assert_ordered(&self, earlier: &str, later: &str) {
        let events = self.snapshot();
        let first = events
            .iter()
            .position(|e| e == earlier)
            .unwrap_or_else(|| panic!("event {earlier:?} missing from {events:?}"));
        let second = events
            .iter()
            .position(|e| e == later)
            .unwrap_or_else(|| panic!("event {later:?} missing from {events:?}"));
        assert!(
            first < second,
            "expected {earlier:?} before {later:?} in {events:?}"
        );
    }
}

/// How a mock volatile participant answers a prepare request.
pub enum PrepareReply {
    /// Vote to commit before returning.
    Prepared,
    /// Vote to commit from a spawned task.
    PreparedAsync,
    /// Vote to abort before returning.
    ForceRollback,
    /// Acknowledge completion without joining the second phase.
    Done,
    /// Enlist the given durable participant through the context, then vote
    /// to commit.
    EnlistDurable(Arc<MockDurable>),
    /// Same, but from a spawned task.
    EnlistDurableAsync(Arc<MockDurable>),
    /// Enlist the given volatile participant through the context, then
    /// vote to commit.
    EnlistVolatile(Arc<MockVolatile>),
    /// Roll the transaction back through the context, then vote to commit.
    NestedRollback,
    /// Same, but from a spawned task.
    NestedRollbackAsync,
}

/// Mock volatile participant recording every callback it receives.
pub struct MockVolatile {
    name: &'static str,
    log: Arc<EventLog>,
    prepare_reply: PrepareReply,
    /// Acknowledge terminal notifications from a spawned task.
    async_ack: bool,
    /// Outcome of a nested call issued from within `prepare`.
    nested_result: Arc<Mutex<Option<Result<()>>>>,
}

impl MockVolatile {
    pub fn new(name: &'static str, log: &Arc<EventLog>, prepare_reply: PrepareReply) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            prepare_reply,
            async_ack: false,
            nested_result: Arc::new(Mutex::new(None)),
        })
    }

    pub fn with_async_acks(
        name: &'static str,
        log: &Arc<EventLog>,
        prepare_reply: PrepareReply,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            prepare_reply,
            async_ack: true,
            nested_result: Arc::new(Mutex::new(None)),
        })
    }

    /// Outcome of the nested enlist/rollback issued during `prepare`.
    pub fn nested_result(&self) -> Option<Result<()>> {
        self.nested_result.lock().take()
    }

    fn ack(&self, enlistment: Enlistment) {
        if self.async_ack {
            tokio::spawn(async move { enlistment.done() });
        } else {
            enlistment.done();
        }
    }
}

#[async_trait]
impl VolatileParticipant for MockVolatile {
    async fn prepare(&self, ctx: &TransactionContext, enlistment: PreparingEnlistment) {
        self.log.push(format!("{}.prepare", self.name));

        match &self.prepare_reply {
            PrepareReply::Prepared => enlistment.prepared(),
            PrepareReply::PreparedAsync => {
                tokio::spawn(async move { enlistment.prepared() });
            }
            PrepareReply::ForceRollback => enlistment.force_rollback("prepare refused"),
            PrepareReply::Done => enlistment.done(),
            PrepareReply::EnlistDurable(durable) => {
                let tx = ctx.current_transaction().expect("ambient transaction");
                *self.nested_result.lock() = Some(tx.enlist_the_only_durable(durable.clone()));
                enlistment.prepared();
            }
            PrepareReply::EnlistDurableAsync(durable) => {
                let tx = ctx.current_transaction().expect("ambient transaction");
                let durable = durable.clone();
                let slot = self.nested_result.clone();
                tokio::spawn(async move {
                    *slot.lock() = Some(tx.enlist_the_only_durable(durable));
                    enlistment.prepared();
                });
            }
            PrepareReply::EnlistVolatile(volatile) => {
                let tx = ctx.current_transaction().expect("ambient transaction");
                *self.nested_result.lock() = Some(tx.enlist_volatile(volatile.clone()));
                enlistment.prepared();
            }
            PrepareReply::NestedRollback => {
                let tx = ctx.current_transaction().expect("ambient transaction");
                *self.nested_result.lock() = Some(tx.rollback(ctx).await);
                enlistment.prepared();
            }
            PrepareReply::NestedRollbackAsync => {
                let tx = ctx.current_transaction().expect("ambient transaction");
                let ctx = ctx.clone();
                let slot = self.nested_result.clone();
                tokio::spawn(async move {
                    *slot.lock() = Some(tx.rollback(&ctx).await);
                    enlistment.prepared();
                });
            }
        }
    }

    async fn commit(&self, _ctx: &TransactionContext, enlistment: Enlistment) {
        self.log.push(format!("{}.commit", self.name));
        self.ack(enlistment);
    }

    async fn rollback(&self, _ctx: &TransactionContext, enlistment: Enlistment) {
        self.log.push(format!("{}.rollback", self.name));
        self.ack(enlistment);
    }
}

/// How a mock durable participant answers a single-phase commit request.
pub enum SinglePhaseReply {
    /// Report success before returning.
    Committed,
    /// Report success from a spawned task.
    CommittedAsync,
    /// Report failure before returning.
    Aborted,
    /// Report failure from a spawned task.
    AbortedAsync,
}

/// Mock durable participant recording every callback it receives.
pub struct MockDurable {
    name: &'static str,
    log: Arc<EventLog>,
    single_phase_reply: SinglePhaseReply,
}

impl MockDurable {
    pub fn new(
        name: &'static str,
        log: &Arc<EventLog>,
        single_phase_reply: SinglePhaseReply,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            single_phase_reply,
        })
    }
}

#[async_trait]
impl VolatileParticipant for MockDurable {
    async fn prepare(&self, _ctx: &TransactionContext, enlistment: PreparingEnlistment) {
        // The coordinator drives the only durable participant through
        // single-phase commit; prepare is never expected here.
        self.log.push(format!("{}.prepare", self.name));
        enlistment.prepared();
    }

    async fn commit(&self, _ctx: &TransactionContext, enlistment: Enlistment) {
        self.log.push(format!("{}.commit", self.name));
        enlistment.done();
    }

    async fn rollback(&self, _ctx: &TransactionContext, enlistment: Enlistment) {
        self.log.push(format!("{}.rollback", self.name));
        enlistment.done();
    }
}

#[async_trait]
impl SinglePhaseParticipant for MockDurable {
    async fn single_phase_commit(
        &self,
        _ctx: &TransactionContext,
        enlistment: SinglePhaseEnlistment,
    ) {
        self.log.push(format!("{}.single_phase_commit", self.name));

        match self.single_phase_reply {
            SinglePhaseReply::Committed => enlistment.committed(),
            SinglePhaseReply::CommittedAsync => {
                tokio::spawn(async move { enlistment.committed() });
            }
            SinglePhaseReply::Aborted => enlistment.aborted("single-phase commit refused"),
            SinglePhaseReply::AbortedAsync => {
                tokio::spawn(async move { enlistment.aborted("single-phase commit refused") });
            }
        }
    }
}
