// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebianS3Error {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("required field missing in control paragraph: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("Control file not found")]
    ControlFileNotFound,

    #[error("unknown compression in deb archive file: {0}")]
    DebUnknownCompression(String),

    #[error("unsupported version string '{0}'")]
    MalformedVersion(String),

    #[error("package {0}_{1} already exists with filename ({2})")]
    DuplicatePackage(String, String, String),

    #[error("file {0} already exists with different contents")]
    AlreadyExists(String),

    #[error("package {0} not found")]
    PackageNotFound(String),

    #[error("package {0} has no payload file to upload")]
    PackagePayloadMissing(String),

    #[error("no architecture given and unable to determine one for {0}")]
    ArchitectureUnknown(String),

    #[error("failed to acquire lock {0}; it was overwritten by another process")]
    LockConflict(String),

    #[error("unable to obtain lock {0} after {1} attempts, giving up")]
    LockTimeout(String, u32),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("store unavailable for {0}: {1}")]
    StoreUnavailable(String, String),

    #[error("repository I/O error on path {0}: {1:?}")]
    RepositoryIoPath(String, std::io::Error),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebianS3Error>;
