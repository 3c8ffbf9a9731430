use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Symbolic error classification reported to callers alongside the message.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
)]
pub enum ErrorKind {
    ArgumentOutOfRange,
    InvalidRequest,
    GuestNotBuilt,
    BuildFailed,
    BuildTimeout,
    UnsafeSourceRejected,
    ExecutionFailed,
    ArtifactNameCollision,
    ArtifactNotFound,
    ArtifactCorrupt,
    MissingCredential,
    Credential,
    OutputParseError,
    Timeout,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("argument out of range: {0}")]
    ArgumentOutOfRange(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("guest `{name}` is not built (expected {})", path.display())]
    GuestNotBuilt { name: String, path: PathBuf },
    #[error("build of guest `{name}` failed:\n{diagnostics}")]
    BuildFailed { name: String, diagnostics: String },
    #[error("build of guest `{name}` timed out after {}s", timeout.as_secs())]
    BuildTimeout { name: String, timeout: Duration },
    #[error("guest source rejected: {0}")]
    UnsafeSourceRejected(String),
    #[error("guest execution failed: {0}")]
    ExecutionFailed(String),
    #[error("proof artifact {} already exists", .0.display())]
    ArtifactNameCollision(PathBuf),
    #[error("proof artifact {} not found", .0.display())]
    ArtifactNotFound(PathBuf),
    #[error("proof artifact is corrupt: {0}")]
    ArtifactCorrupt(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
    #[error("credential error: {0}")]
    Credential(String),
    #[error("could not parse process output: {0}")]
    OutputParseError(String),
    #[error("`{what}` timed out after {}s", timeout.as_secs())]
    Timeout { what: String, timeout: Duration },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArgumentOutOfRange(_) => ErrorKind::ArgumentOutOfRange,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::GuestNotBuilt { .. } => ErrorKind::GuestNotBuilt,
            Error::BuildFailed { .. } => ErrorKind::BuildFailed,
            Error::BuildTimeout { .. } => ErrorKind::BuildTimeout,
            Error::UnsafeSourceRejected(_) => ErrorKind::UnsafeSourceRejected,
            Error::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            Error::ArtifactNameCollision(_) => ErrorKind::ArtifactNameCollision,
            Error::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            Error::ArtifactCorrupt(_) => ErrorKind::ArtifactCorrupt,
            Error::MissingCredential(_) => ErrorKind::MissingCredential,
            Error::Credential(_) => ErrorKind::Credential,
            Error::OutputParseError(_) => ErrorKind::OutputParseError,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Remediation text shown to the user next to the error.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::GuestNotBuilt { .. } => Some("run the build step first (`cargo zkcalc build`)"),
            Error::BuildTimeout { .. } => Some("pre-build outside the request path"),
            Error::ArtifactNameCollision(_) => Some("retry the request"),
            Error::MissingCredential(_) => {
                Some("set ZKCALC_PASSPHRASE or pass --passphrase to unlock signing keys")
            }
            Error::UnsafeSourceRejected(_) => {
                Some("remove filesystem, network, thread, process, unsafe and FFI usage")
            }
            Error::Timeout { .. } => Some("retry, or raise the configured timeout"),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BuildTimeout { .. } | Error::Timeout { .. } | Error::ArtifactNameCollision(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
