use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::{ContextToken, ConversationContext, Payload};

/// A completed workflow payload on its way to the external sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// blake3 digest of the terminal context token. The platform redelivers
    /// terminal events verbatim, so duplicates hash to the same key.
    pub idempotency_key: String,
    pub workflow_id: String,
    pub originating_user_id: String,
    pub destination_channel_id: String,
    pub fields: Payload,
}

impl Submission {
    pub fn from_terminal_context(token: &ContextToken, context: &ConversationContext) -> Self {
        Self {
            idempotency_key: blake3::hash(token.as_str().as_bytes()).to_hex().to_string(),
            workflow_id: context.workflow_id.clone(),
            originating_user_id: context.originating_user_id.clone(),
            destination_channel_id: context.destination_channel_id.clone(),
            fields: context.payload.clone(),
        }
    }

    /// Body posted to the sink.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "idempotency_key": self.idempotency_key,
            "workflow_id": self.workflow_id,
            "submitted_by": self.originating_user_id,
            "channel": self.destination_channel_id,
            "fields": self.fields.to_json(),
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("relay sink unreachable: {0}")]
    Unreachable(String),
    #[error("relay sink rejected the submission: {0}")]
    Rejected(String),
}

/// Delivery of a completed submission. Failures surface to the caller;
/// the payload is user-submitted data with no other durable record, so
/// fire-and-forget is not an option here.
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<S> RelaySink for &S
where
    S: RelaySink + ?Sized,
{
    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError> {
        (**self).deliver(submission).await
    }
}

#[async_trait]
impl<S> RelaySink for std::sync::Arc<S>
where
    S: RelaySink + ?Sized,
{
    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError> {
        (**self).deliver(submission).await
    }
}

#[derive(Default)]
pub struct NoopRelaySink;

#[async_trait]
impl RelaySink for NoopRelaySink {
    async fn deliver(&self, _submission: &Submission) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Absorbs duplicate deliveries of the same idempotency key.
///
/// The delivered-key set lives in process memory only: within one process
/// lifetime delivery is exactly-once per key, across restarts it degrades to
/// at-least-once. A key is reserved for the duration of an attempt, so a
/// duplicate racing an in-flight delivery is absorbed; if the attempt fails
/// the key is released and a later manual retry can go through.
pub struct DedupingRelay<S> {
    inner: S,
    delivered: Mutex<HashSet<String>>,
}

impl<S> DedupingRelay<S>
where
    S: RelaySink,
{
    pub fn new(inner: S) -> Self {
        Self { inner, delivered: Mutex::new(HashSet::new()) }
    }

    fn reserve(&self, key: &str) -> bool {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        delivered.insert(key.to_owned())
    }

    fn release(&self, key: &str) {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        delivered.remove(key);
    }
}

#[async_trait]
impl<S> RelaySink for DedupingRelay<S>
where
    S: RelaySink,
{
    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError> {
        if !self.reserve(&submission.idempotency_key) {
            return Ok(());
        }

        match self.inner.deliver(submission).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.release(&submission.idempotency_key);
                Err(error)
            }
        }
    }
}
