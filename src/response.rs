//! Response channel protocol between the coordinator and its participants.
//!
//! Every protocol request hands the participant an enlistment handle tied
//! to a shared response channel. A handle exposes exactly the verbs of its
//! capability set and consumes itself on use, so a participant posts
//! exactly one response per request. Responses may be posted before the
//! notification method returns or later from another task; the
//! coordinator treats both the same.

use tokio::sync::mpsc;

/// Cause a participant may attach to a negative vote.
pub type AbortCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Enlistment id reserved for the only durable participant.
pub(crate) const TOD_ENLISTMENT_ID: i64 = -1;

/// Transport code of a participant response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseCode {
    /// Terminal acknowledgement; during prepare it also waives the
    /// participant's terminal commit/rollback notification.
    Done,
    /// Negative vote.
    Abort,
    /// Affirmative vote.
    Commit,
}

/// One participant response travelling through the channel.
#[derive(Debug)]
pub(crate) struct ResponseMessage {
    pub code: ResponseCode,
    pub enlistment_id: i64,
    pub cause: Option<AbortCause>,
}

pub(crate) type ResponseSender = mpsc::Sender<ResponseMessage>;
pub(crate) type ResponseReceiver = mpsc::Receiver<ResponseMessage>;

/// Open a response channel able to hold one response per outstanding
/// request, so participant posts never block.
pub(crate) fn response_channel(outstanding: usize) -> (ResponseSender, ResponseReceiver) {
    mpsc::channel(outstanding.max(1))
}

fn post(responses: &ResponseSender, message: ResponseMessage) {
    // The channel is sized for every outstanding request; a failed post can
    // only mean the drain already finished with this channel.
    if let Err(err) = responses.try_send(message) {
        tracing::debug!("discarding late participant response: {}", err);
    }
}

/// Handle carried by a terminal commit or rollback notification.
#[derive(Debug)]
pub struct Enlistment {
    id: i64,
    responses: ResponseSender,
}

impl Enlistment {
    pub(crate) fn new(id: i64, responses: ResponseSender) -> Self {
        Self { id, responses }
    }

    /// Acknowledge that the participant finished its terminal work.
    pub fn done(self) {
        post(
            &self.responses,
            ResponseMessage {
                code: ResponseCode::Done,
                enlistment_id: self.id,
                cause: None,
            },
        );
    }
}

/// Handle carried by a first-phase prepare notification.
#[derive(Debug)]
pub struct PreparingEnlistment {
    id: i64,
    responses: ResponseSender,
}

impl PreparingEnlistment {
    pub(crate) fn new(id: i64, responses: ResponseSender) -> Self {
        Self { id, responses }
    }

    /// Complete the participant's work now, without taking part in the
    /// second phase.
    pub fn done(self) {
        post(
            &self.responses,
            ResponseMessage {
                code: ResponseCode::Done,
                enlistment_id: self.id,
                cause: None,
            },
        );
    }

    /// Vote to commit the transaction.
    pub fn prepared(self) {
        post(
            &self.responses,
            ResponseMessage {
                code: ResponseCode::Commit,
                enlistment_id: self.id,
                cause: None,
            },
        );
    }

    /// Vote to roll the transaction back.
    pub fn force_rollback(self, cause: impl Into<AbortCause>) {
        post(
            &self.responses,
            ResponseMessage {
                code: ResponseCode::Abort,
                enlistment_id: self.id,
                cause: Some(cause.into()),
            },
        );
    }
}

/// Handle carried by a single-phase commit notification.
#[derive(Debug)]
pub struct SinglePhaseEnlistment {
    id: i64,
    responses: ResponseSender,
}

impl SinglePhaseEnlistment {
    pub(crate) fn new(id: i64, responses: ResponseSender) -> Self {
        Self { id, responses }
    }

    /// Report that the combined prepare-and-commit step succeeded.
    pub fn committed(self) {
        post(
            &self.responses,
            ResponseMessage {
                code: ResponseCode::Commit,
                enlistment_id: self.id,
                cause: None,
            },
        );
    }

    /// Report that the combined prepare-and-commit step failed.
    pub fn aborted(self, cause: impl Into<AbortCause>) {
        post(
            &self.responses,
            ResponseMessage {
                code: ResponseCode::Abort,
                enlistment_id: self.id,
                cause: Some(cause.into()),
            },
        );
    }
}

/// Consume `outstanding` responses on a detached task, then close the
/// channel. Participant-side failures reported here are already past the
/// decision point, so they are logged and discarded.
pub(crate) fn drain_in_background(mut receiver: ResponseReceiver, outstanding: usize) {
    tokio::spawn(async move {
        for _ in 0..outstanding {
            match receiver.recv().await {
                Some(response) => {
                    if let Some(cause) = &response.cause {
                        tracing::debug!(
                            "discarding abort cause from enlistment {}: {}",
                            response.enlistment_id,
                            cause
                        );
                    }
                }
                None => break,
            }
        }
    });
}
