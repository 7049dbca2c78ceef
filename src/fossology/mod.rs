//! Bridge between release clearing records and a FOSSology scanning server.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Release, upload and status model shared by every layer
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Typed errors and retry classification
//! - `hostkey`: Host key verification against a fingerprint repository
//! - `credentials`: Private key registry guarding cold session creation
//! - `session` / `client`: Remote session abstraction and its russh implementation
//! - `storage`: Idle session cache
//! - `pool`: Bounded pool of authenticated sessions
//! - `executor`: Single command execution with a hard timeout
//! - `protocol`: Remote command templates and output parsing
//! - `uploader`: SSH transport built on the executor
//! - `rest`: REST API transport (feature-gated)
//! - `transport`: Transport abstraction consumed by the orchestrator
//! - `store`: Release store and attachment source seams
//! - `orchestrator`: Send-to-scanning and status refresh state machine

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod hostkey;
pub mod orchestrator;
pub mod pool;
pub mod protocol;
#[cfg(feature = "rest")]
pub mod rest;
pub mod session;
pub mod storage;
pub mod store;
pub mod transport;
pub mod types;
pub mod uploader;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BridgeConfig, RestConfig, SshConfig, TransportKind};
pub use error::{ConfigError, ExecError, OrchestratorError, ParseError, SessionError, StoreError};
pub use executor::CommandExecutor;
pub use orchestrator::UploadOrchestrator;
pub use pool::SessionPool;
pub use store::{AttachmentSource, ReleaseStore};
pub use transport::ScanTransport;
#[cfg(feature = "rest")]
pub use transport::RestScanTransport;
pub use types::{Attachment, AttachmentKind, ClearingState, ExternalStatus, Release, RemoteUpload};
pub use uploader::SshUploader;
