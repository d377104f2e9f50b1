// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory blob store. */

use {
    crate::{
        error::{DebianS3Error, Result},
        io::md5_hex,
        store::{BlobMetadata, BlobStore, BlobWrite, PutOptions},
    },
    async_trait::async_trait,
    std::{
        collections::BTreeMap,
        sync::{Mutex, MutexGuard},
    },
};

#[derive(Clone, Debug)]
struct StoredBlob {
    data: Vec<u8>,
    options: PutOptions,
}

#[derive(Debug, Default)]
struct State {
    blobs: BTreeMap<String, StoredBlob>,
    writes: usize,
}

/// A [BlobStore] holding blobs in process memory.
///
/// Reads always observe prior writes. The ETag of a blob is the MD5 of its content.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
}

impl MemoryBlobStore {
    fn state(&self, key: &str) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            DebianS3Error::StoreUnavailable(key.to_string(), "memory store lock poisoned".into())
        })
    }

    /// Keys of all stored blobs, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.state("")
            .map(|state| state.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Obtain the content of a blob without going through the async interface.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state(key)
            .ok()
            .and_then(|state| state.blobs.get(key).map(|b| b.data.clone()))
    }

    /// Obtain the options a blob was last written with.
    pub fn put_options(&self, key: &str) -> Option<PutOptions> {
        self.state(key)
            .ok()
            .and_then(|state| state.blobs.get(key).map(|b| b.options.clone()))
    }

    /// Total number of writes performed.
    pub fn write_count(&self) -> usize {
        self.state("").map(|state| state.writes).unwrap_or_default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>> {
        Ok(self.state(key)?.blobs.get(key).map(|blob| BlobMetadata {
            size: blob.data.len() as u64,
            etag: Some(md5_hex(&blob.data)),
            md5: blob.options.md5.clone(),
        }))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state(key)?.blobs.get(key).map(|blob| blob.data.clone()))
    }

    async fn put(&self, key: &str, data: Vec<u8>, options: &PutOptions) -> Result<BlobWrite> {
        let bytes_written = data.len() as u64;

        let mut state = self.state(key)?;
        state.writes += 1;
        state.blobs.insert(
            key.to_string(),
            StoredBlob {
                data,
                options: options.clone(),
            },
        );

        Ok(BlobWrite {
            key: key.to_string(),
            bytes_written,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state(key)?.blobs.remove(key);

        Ok(())
    }
}
