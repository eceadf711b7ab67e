//! Local in-process transaction coordinator.
//!
//! Orchestrates volatile and durable resource managers co-located in the
//! same process through Two-Phase Commit (2PC), with a Single-Phase Commit
//! (SPC) optimization for the only durable participant.
//!
//! This crate provides:
//! - The committable transaction state machine and its commit/rollback
//!   coordinators
//! - Participant capability traits and the enlistment handle protocol
//!   participants use to answer prepare/commit/rollback requests
//! - An ambient transaction carrier and a scope facade with
//!   required/requires-new/suppress/bound binding policies

mod context;
mod error;
mod participant;
mod response;
mod scope;
mod transaction;

pub use context::TransactionContext;
pub use error::{Result, TransactionError};
pub use participant::{SinglePhaseParticipant, VolatileParticipant};
pub use response::{AbortCause, Enlistment, PreparingEnlistment, SinglePhaseEnlistment};
pub use scope::{ScopePolicy, TransactionScope, with_transaction_scope};
pub use transaction::{CommittableTransaction, Transaction, TransactionState};
