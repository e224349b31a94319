//! clockface-client: the kiosk's remote collaborators.
//!
//! The attendance server's verification and registration endpoints, the
//! retrying verification client, and the D-Bus face engine client.

pub mod engine;
pub mod http;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod verifier;

pub use engine::FaceEngineClient;
pub use http::{HttpConfig, HttpTransport};
pub use protocol::{FaceData, VerificationOutcome, VerifyResponse};
pub use retry::RetryPolicy;
pub use transport::{TransportError, VerificationTransport};
pub use verifier::{
    VerificationAttempt, VerificationClient, VerificationError, VerificationEvent,
    VerificationSink,
};
