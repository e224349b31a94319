//! Verification attempts with bounded retry.
//!
//! An attempt is one encoded face sent to the server, inclusive of its
//! retries. [`VerificationClient`] runs at most one attempt at a time:
//! submitting a new one aborts the previous task together with any pending
//! backoff timer.

use crate::protocol::{FaceData, ProtocolError, VerificationOutcome};
use crate::retry::RetryPolicy;
use crate::transport::{TransportError, VerificationTransport};
use chrono::{DateTime, Utc};
use clockface_core::encoding::{encode_descriptor, encode_snapshot, EncodingError};
use clockface_core::Descriptor;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("server unreachable after {attempts} attempts: {last}")]
    NetworkExhausted { attempts: u32, last: TransportError },
    #[error("server rejected the request: {0}")]
    Rejected(TransportError),
    #[error("malformed verification reply: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct VerificationAttempt {
    pub id: Uuid,
    pub face_data: FaceData,
    /// Transport calls made so far.
    pub attempt_count: u32,
    pub started_at: DateTime<Utc>,
}

impl VerificationAttempt {
    pub fn new(face_data: FaceData) -> Self {
        Self {
            id: Uuid::new_v4(),
            face_data,
            attempt_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Encode a descriptor and optional snapshot into a fresh attempt. The
    /// encoded payload is reused unchanged by every retry.
    pub fn encode(
        descriptor: &Descriptor,
        snapshot: Option<&RgbImage>,
        jpeg_quality: u8,
    ) -> Result<Self, EncodingError> {
        let encoding = encode_descriptor(descriptor)?;
        let image = snapshot
            .map(|frame| encode_snapshot(frame, jpeg_quality))
            .transpose()?;
        Ok(Self::new(FaceData { encoding, image }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEvent {
    /// A transient failure occurred; retry `retry` of `max_retries` follows
    /// after `delay`.
    Retrying {
        attempt: Uuid,
        retry: u32,
        max_retries: u32,
        delay: Duration,
    },
    Finished {
        attempt: Uuid,
        result: Result<VerificationOutcome, VerificationError>,
    },
}

pub type VerificationSink = Arc<dyn Fn(VerificationEvent) + Send + Sync>;

/// Run one attempt to completion: the first call plus up to
/// `policy.max_retries` retries on transient failure.
pub async fn run_attempt(
    transport: &dyn VerificationTransport,
    policy: &RetryPolicy,
    attempt: &mut VerificationAttempt,
    on_retry: &(dyn Fn(VerificationEvent) + Send + Sync),
) -> Result<VerificationOutcome, VerificationError> {
    loop {
        attempt.attempt_count += 1;
        let err = match transport.verify(&attempt.face_data).await {
            Ok(reply) => {
                let outcome = reply.classify()?;
                tracing::info!(
                    attempt = %attempt.id,
                    calls = attempt.attempt_count,
                    matched = matches!(outcome, VerificationOutcome::Success(_)),
                    "verification finished"
                );
                return Ok(outcome);
            }
            Err(e) => e,
        };

        if !err.is_transient() {
            tracing::warn!(attempt = %attempt.id, error = %err, "verification rejected");
            return Err(VerificationError::Rejected(err));
        }
        let retry = attempt.attempt_count;
        if retry > policy.max_retries {
            tracing::error!(
                attempt = %attempt.id,
                calls = attempt.attempt_count,
                error = %err,
                "verification retries exhausted"
            );
            return Err(VerificationError::NetworkExhausted {
                attempts: attempt.attempt_count,
                last: err,
            });
        }

        let delay = policy.delay_for(retry);
        tracing::warn!(
            attempt = %attempt.id,
            retry,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "verification failed, retrying"
        );
        on_retry(VerificationEvent::Retrying {
            attempt: attempt.id,
            retry,
            max_retries: policy.max_retries,
            delay,
        });
        tokio::time::sleep(delay).await;
    }
}

pub struct VerificationClient {
    transport: Arc<dyn VerificationTransport>,
    policy: RetryPolicy,
    inflight: Option<JoinHandle<()>>,
}

impl VerificationClient {
    pub fn new(transport: Arc<dyn VerificationTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            inflight: None,
        }
    }

    /// Start an attempt, superseding any previous one. Progress and the
    /// terminal result are delivered to `sink`.
    pub fn submit(&mut self, mut attempt: VerificationAttempt, sink: VerificationSink) -> Uuid {
        self.cancel();
        let id = attempt.id;
        let transport = Arc::clone(&self.transport);
        let policy = self.policy;
        tracing::debug!(attempt = %id, started_at = %attempt.started_at, "verification submitted");
        self.inflight = Some(tokio::spawn(async move {
            let result = run_attempt(transport.as_ref(), &policy, &mut attempt, sink.as_ref()).await;
            sink(VerificationEvent::Finished {
                attempt: attempt.id,
                result,
            });
        }));
        id
    }

    /// Abort the running attempt, if any. Its result is never delivered.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.inflight.take() {
            if !handle.is_finished() {
                tracing::debug!("verification attempt cancelled");
            }
            handle.abort();
        }
    }
}

impl Drop for VerificationClient {
    fn drop(&mut self) {
        self.cancel();
    }
}
