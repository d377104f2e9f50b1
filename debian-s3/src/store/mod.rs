// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Blob storage backing a repository.

Repository state lives in a key/value blob store. Keys are repository relative
paths like `dists/stable/Release`. Stores may be eventually consistent and offer
no locking primitive.

Writes record an MD5 fingerprint of the content in blob metadata. [store_blob()]
uses it to tell an identical re-upload (a no-op) from content drift.
*/

use {
    crate::{
        config::{AccessPolicy, PublishConfig},
        error::{DebianS3Error, Result},
        io::md5_hex,
    },
    async_trait::async_trait,
};

pub mod filesystem;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

/// Metadata of a stored blob.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlobMetadata {
    /// Size of the content in bytes.
    pub size: u64,

    /// Entity tag reported by the store, without surrounding quotes.
    pub etag: Option<String>,

    /// MD5 fingerprint recorded at write time.
    pub md5: Option<String>,
}

impl BlobMetadata {
    /// Whether the blob is known to hold content with the given hex MD5.
    pub fn matches_md5(&self, md5: &str) -> bool {
        self.md5.as_deref() == Some(md5) || self.etag.as_deref() == Some(md5)
    }
}

/// Options for writing a blob.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PutOptions {
    /// `Content-Type` of the blob.
    pub content_type: String,

    /// `Cache-Control` of the blob.
    pub cache_control: Option<String>,

    /// Access policy applied to the blob.
    pub access_policy: AccessPolicy,

    /// Hex MD5 fingerprint to record in blob metadata.
    pub md5: Option<String>,
}

impl PutOptions {
    /// Construct options for a content type, taking the rest from a [PublishConfig].
    pub fn new(content_type: impl ToString, config: &PublishConfig) -> Self {
        Self {
            content_type: content_type.to_string(),
            cache_control: config.cache_control.clone(),
            access_policy: config.visibility,
            md5: None,
        }
    }
}

/// Describes a completed write.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlobWrite {
    /// The key that was written.
    pub key: String,

    /// The number of bytes written.
    pub bytes_written: u64,
}

/// A key/value blob store.
///
/// Missing keys are reported as [None], never as errors. Transport failures
/// surface as [DebianS3Error::StoreUnavailable].
#[async_trait]
pub trait BlobStore: Sync {
    /// Obtain metadata of a blob, if it exists.
    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>>;

    /// Whether a blob exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.metadata(key).await?.is_some())
    }

    /// Read the content of a blob, if it exists.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a blob unconditionally.
    async fn put(&self, key: &str, data: Vec<u8>, options: &PutOptions) -> Result<BlobWrite>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Outcome of [store_blob()].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreOutcome {
    /// Content was written.
    Written(BlobWrite),

    /// The blob already held identical content.
    Unchanged,
}

/// Write a blob, skipping the write when identical content is already stored.
///
/// When the stored fingerprint differs and `fail_if_exists` is set, fails with
/// [DebianS3Error::AlreadyExists]. Otherwise the blob is overwritten.
pub async fn store_blob(
    store: &dyn BlobStore,
    key: &str,
    data: Vec<u8>,
    mut options: PutOptions,
    fail_if_exists: bool,
) -> Result<StoreOutcome> {
    let md5 = md5_hex(&data);

    if let Some(existing) = store.metadata(key).await? {
        if existing.matches_md5(&md5) {
            log::debug!("{} unchanged; skipping write", key);
            return Ok(StoreOutcome::Unchanged);
        }

        if fail_if_exists {
            return Err(DebianS3Error::AlreadyExists(key.to_string()));
        }
    }

    options.md5 = Some(md5);

    Ok(StoreOutcome::Written(store.put(key, data, &options).await?))
}

/// Read a blob as UTF-8 text, if it exists.
pub async fn read_text(store: &dyn BlobStore, key: &str) -> Result<Option<String>> {
    match store.read(key).await? {
        Some(data) => Ok(Some(String::from_utf8(data).map_err(|e| {
            DebianS3Error::ControlParseError(format!("{} is not UTF-8: {}", key, e))
        })?)),
        None => Ok(None),
    }
}
