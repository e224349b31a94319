//! HTTP transport over `ureq`.
//!
//! `ureq` is blocking; every call runs under `spawn_blocking` so the
//! single-threaded kiosk runtime keeps scheduling timers while a request is
//! outstanding.

use crate::protocol::{
    FaceData, RegisterParams, RegisterResponse, RpcRequest, RpcResponse, VerifyParams,
    VerifyResponse, REGISTER_PATH, VERIFY_PATH,
};
use crate::transport::{TransportError, VerificationTransport};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub server_url: String,
    /// Value of the `session_id` cookie, if the endpoint needs a session.
    pub session_id: Option<String>,
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_id: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

struct Inner {
    agent: ureq::Agent,
    base_url: String,
    session_id: Option<String>,
    timeout: Duration,
    next_id: AtomicU64,
}

/// JSON-RPC client for the attendance server. Cheap to clone.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            inner: Arc::new(Inner {
                agent,
                base_url: config.server_url.trim_end_matches('/').to_string(),
                session_id: config.session_id,
                timeout: config.timeout,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Store an encoded descriptor for an employee. Not retried.
    pub async fn register(
        &self,
        employee_id: i64,
        encoded: &str,
    ) -> Result<RegisterResponse, TransportError> {
        let body = RpcRequest::call(
            self.inner.next_id(),
            RegisterParams {
                employee_id,
                face_data: encoded,
            },
        );
        self.call(REGISTER_PATH, &body).await
    }

    async fn call<B, T>(&self, path: &'static str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize,
        T: DeserializeOwned + Send + 'static,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| TransportError::InvalidResponse(format!("request encoding: {e}")))?;
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.post(path, &body))
            .await
            .map_err(|e| TransportError::Network(format!("request task failed: {e}")))?
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .agent
            .post(&url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json");
        if let Some(sid) = &self.session_id {
            request = request.set("Cookie", &format!("session_id={sid}"));
        }

        let response = request.send_json(body).map_err(|e| match e {
            ureq::Error::Status(code, _) => TransportError::Status(code),
            ureq::Error::Transport(t) => {
                let msg = t.to_string();
                if msg.contains("timeout") || msg.contains("timed out") {
                    TransportError::Timeout
                } else {
                    TransportError::Network(msg)
                }
            }
        })?;

        let reply: RpcResponse<T> = response
            .into_json()
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        if let Some(err) = reply.error {
            return Err(TransportError::Rpc {
                code: err.code,
                message: err.describe(),
            });
        }
        reply
            .result
            .ok_or_else(|| TransportError::InvalidResponse("reply has neither result nor error".into()))
    }
}

#[async_trait]
impl VerificationTransport for HttpTransport {
    async fn verify(&self, face: &FaceData) -> Result<VerifyResponse, TransportError> {
        let body = RpcRequest::call(self.inner.next_id(), VerifyParams { face_data: face });
        tracing::debug!(url = %self.inner.base_url, path = VERIFY_PATH, "sending verification");
        self.call(VERIFY_PATH, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let t = HttpTransport::new(HttpConfig::new("http://kiosk.local:8069/"));
        assert_eq!(t.server_url(), "http://kiosk.local:8069");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let mut config = HttpConfig::new("http://127.0.0.1:9");
        config.timeout = Duration::from_millis(500);
        let t = HttpTransport::new(config);
        let face = FaceData {
            encoding: "W10=".into(),
            image: None,
        };
        let err = t.verify(&face).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }
}
