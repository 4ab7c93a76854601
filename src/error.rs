//! The three error layers in play between the kernel, this daemon, and the server.
//!
//! [`HostStatus`] is what ultimately goes back to the kernel on every downcall.
//! [`NfsStatus`] is what the RPC layer hands us after a COMPOUND reply.
//! [`RpcStatus`] is transport-level trouble that never reached the server's
//! NFS processing at all. The three must never be confused with one another;
//! [`nfs_to_host_error`] is the single place that crosses the NFS -> host
//! boundary.

use num_derive::{FromPrimitive, ToPrimitive};
use thiserror::Error;

/// Status handed back to the kernel on a downcall. Values are bit-exact with
/// the host error catalog in use by the kernel driver (see the external
/// interfaces section of the design).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum HostStatus {
    Success = 0,
    FileNotFound = 2,
    AccessDenied = 5,
    FileExists = 80,
    BadFileType = 222,
    FilenameExcedRange = 206,
    Directory = 267,
    TooManyLinks = 1142,
    Reparse = 741,
    BufferOverflow = 111,
    InternalError = 1359,
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for HostStatus {}

/// NFSv4 protocol status codes relevant to the open-state engine. This is not
/// exhaustive of RFC 5661 Table 3 -- only the subset this crate dispatches on
/// or must pass through unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NfsStatus {
    Ok,
    Perm,
    NoEnt,
    Access,
    Exist,
    NotDir,
    IsDir,
    Inval,
    NameTooLong,
    FileOpen,
    Delay,
    Grace,
    StaleStateid,
    OldStateid,
    BadStateid,
    Expired,
    Stale,
    BadType,
    /// Anything this crate does not need to dispatch on by name.
    Other(u32),
}

impl std::fmt::Display for NfsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for NfsStatus {}

/// RPC transport-level trouble. Generally fatal at this layer; we propagate
/// it to the caller rather than interpreting it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RpcStatus {
    Timedout,
    CantSend,
    CantRecv,
    AuthError,
    VersionMismatch,
    Other(i32),
}

impl std::fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for RpcStatus {}

/// Anything a collaborator call can fail with, before it gets mapped down to
/// a single [`HostStatus`] for the downcall.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("nfs error: {0}")]
    Nfs(#[from] NfsStatus),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcStatus),
}

/// Maps an NFS protocol status to the host status space. `fallback` is the
/// status to use for NFS errors this function does not special-case --
/// callers pick a context-appropriate fallback (e.g. `FileNotFound` for OPEN).
pub fn nfs_to_host_error(status: NfsStatus, fallback: HostStatus) -> HostStatus {
    match status {
        NfsStatus::Ok => HostStatus::Success,
        NfsStatus::NoEnt => HostStatus::FileNotFound,
        NfsStatus::Exist => HostStatus::FileExists,
        NfsStatus::Access | NfsStatus::Perm => HostStatus::AccessDenied,
        NfsStatus::IsDir => HostStatus::Directory,
        NfsStatus::BadType => HostStatus::BadFileType,
        NfsStatus::NameTooLong => HostStatus::FilenameExcedRange,
        _ => fallback,
    }
}

/// Error surface of the OPEN driver (C5).
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("nfs error during open: {0}")]
    Nfs(NfsStatus),
    #[error("rpc error during open: {0}")]
    Rpc(RpcStatus),
    #[error("host error: {0}")]
    Host(HostStatus),
}

impl OpenError {
    /// Maps this error down to the single host status a downcall carries.
    /// `fallback` is the context-specific default (see [`nfs_to_host_error`]).
    pub fn to_host(&self, fallback: HostStatus) -> HostStatus {
        match self {
            OpenError::Nfs(status) => nfs_to_host_error(*status, fallback),
            OpenError::Rpc(_) => HostStatus::InternalError,
            OpenError::Host(status) => *status,
        }
    }
}

impl From<NfsStatus> for OpenError {
    fn from(status: NfsStatus) -> Self {
        OpenError::Nfs(status)
    }
}

impl From<RpcStatus> for OpenError {
    fn from(status: RpcStatus) -> Self {
        OpenError::Rpc(status)
    }
}

impl From<HostStatus> for OpenError {
    fn from(status: HostStatus) -> Self {
        OpenError::Host(status)
    }
}

/// Error surface of the CLOSE driver (C7). CLOSE never silently swallows a
/// REMOVE failure in favor of a CLOSE success or vice versa -- see
/// [`crate::close_driver::close`].
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("nfs error during close: {0}")]
    Nfs(NfsStatus),
    #[error("rpc error during close: {0}")]
    Rpc(RpcStatus),
}

impl From<NfsStatus> for CloseError {
    fn from(status: NfsStatus) -> Self {
        CloseError::Nfs(status)
    }
}

impl From<RpcStatus> for CloseError {
    fn from(status: RpcStatus) -> Self {
        CloseError::Rpc(status)
    }
}
