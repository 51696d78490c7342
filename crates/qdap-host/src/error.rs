// SPDX-License-Identifier: Apache-2.0
//! Error types for QDAP device interaction.
//!
//! Every status code crossing the plugin boundary is translated into a
//! [`QdapError`] at the call site before any further logic runs; raw codes
//! never travel up the stack. `BadState` and `InvalidArgument` carry the
//! name of the operation (and, for host-side gating, the precondition) that
//! failed, so misuse stays debuggable across the FFI boundary.

use crate::ffi;

/// Errors arising from QDAP device operations.
#[derive(Debug, thiserror::Error)]
pub enum QdapError {
    #[error("failed to load device library at '{path}': {cause}")]
    LoadFailed { path: String, cause: String },

    /// One or more of the 18 required entry points could not be resolved.
    /// The device is unusable; no partially-resolved handle is ever returned.
    #[error("device library '{path}' (prefix '{prefix}') is missing required symbols: {missing:?}")]
    MissingSymbols {
        path: String,
        prefix: String,
        missing: Vec<String>,
    },

    #[error("property or operation not supported by this device")]
    NotSupported,

    #[error("operation not implemented by this device")]
    NotImplemented,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bad state: {0}")]
    BadState(String),

    #[error("operation timed out")]
    Timeout,

    #[error("device reported out of memory")]
    OutOfMemory,

    #[error("requested entity not found on device")]
    NotFound,

    #[error("device reported value out of range")]
    OutOfRange,

    #[error("permission denied by device")]
    PermissionDenied,

    #[error("device library dependency not found")]
    LibNotFound,

    /// Unrecoverable backend failure. The device handle should be torn down.
    #[error("fatal device error during '{0}'")]
    Fatal(String),

    #[error("device returned unknown status code {code} during '{op}'")]
    DeviceError { code: i32, op: &'static str },

    #[error("failed to decode device response: {0}")]
    DecodeError(String),

    #[error("session error: {0}")]
    SessionError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QdapError {
    /// Convert a raw boundary status code into a typed error.
    ///
    /// `op` names the boundary operation for the variants whose meaning
    /// depends on context.
    pub fn from_code(code: i32, op: &'static str) -> Self {
        match code {
            ffi::QDAP_ERROR_NOTSUPPORTED => QdapError::NotSupported,
            ffi::QDAP_ERROR_NOTIMPLEMENTED => QdapError::NotImplemented,
            ffi::QDAP_ERROR_INVALIDARGUMENT => {
                QdapError::InvalidArgument(format!("rejected by device during '{op}'"))
            }
            ffi::QDAP_ERROR_BADSTATE => {
                QdapError::BadState(format!("device rejected '{op}' in its current state"))
            }
            ffi::QDAP_ERROR_TIMEOUT => QdapError::Timeout,
            ffi::QDAP_ERROR_OUTOFMEM => QdapError::OutOfMemory,
            ffi::QDAP_ERROR_NOTFOUND => QdapError::NotFound,
            ffi::QDAP_ERROR_OUTOFRANGE => QdapError::OutOfRange,
            ffi::QDAP_ERROR_PERMISSIONDENIED => QdapError::PermissionDenied,
            ffi::QDAP_ERROR_LIBNOTFOUND => QdapError::LibNotFound,
            ffi::QDAP_ERROR_FATAL => QdapError::Fatal(op.to_string()),
            other => QdapError::DeviceError { code: other, op },
        }
    }
}

pub type Result<T> = std::result::Result<T, QdapError>;

/// Translate a boundary status into a `Result`, logging warnings.
///
/// `QDAP_WARN_GENERAL` is a success with a caveat: the host may continue,
/// but the warning is surfaced through tracing.
pub(crate) fn check(code: i32, op: &'static str) -> Result<()> {
    if code == ffi::QDAP_WARN_GENERAL {
        tracing::warn!("device reported a warning during '{op}'");
        return Ok(());
    }
    if ffi::is_success(code) {
        Ok(())
    } else {
        Err(QdapError::from_code(code, op))
    }
}
