// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem backed blob store. */

use {
    crate::{
        error::{DebianS3Error, Result},
        io::md5_hex,
        store::{BlobMetadata, BlobStore, BlobWrite, PutOptions},
    },
    async_trait::async_trait,
    std::{
        io::ErrorKind,
        path::{Path, PathBuf},
    },
};

/// A [BlobStore] writing blobs as files under a root directory.
///
/// Content types, cache control and access policies have no filesystem equivalent
/// and are ignored. The MD5 fingerprint is computed from file content on demand.
#[derive(Clone, Debug)]
pub struct FilesystemBlobStore {
    root_dir: PathBuf,
}

impl FilesystemBlobStore {
    /// Construct a new instance, bound to the root directory specified.
    ///
    /// No validation of the passed path is performed. The directory does not need to exist.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root_dir: path.as_ref().to_path_buf(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key.trim_matches('/'))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>> {
        let data = match self.read(key).await? {
            Some(data) => data,
            None => return Ok(None),
        };

        Ok(Some(BlobMetadata {
            size: data.len() as u64,
            etag: None,
            md5: Some(md5_hex(&data)),
        }))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key);

        match async_std::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DebianS3Error::RepositoryIoPath(
                format!("{}", path.display()),
                e,
            )),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, _options: &PutOptions) -> Result<BlobWrite> {
        let dest_path = self.key_path(key);

        if let Some(parent) = dest_path.parent() {
            async_std::fs::create_dir_all(parent)
                .await
                .map_err(|e| DebianS3Error::RepositoryIoPath(format!("{}", parent.display()), e))?;
        }

        let bytes_written = data.len() as u64;

        async_std::fs::write(&dest_path, data)
            .await
            .map_err(|e| DebianS3Error::RepositoryIoPath(format!("{}", dest_path.display()), e))?;

        Ok(BlobWrite {
            key: key.to_string(),
            bytes_written,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);

        match async_std::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DebianS3Error::RepositoryIoPath(
                format!("{}", path.display()),
                e,
            )),
        }
    }
}
