// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Amazon S3 backed blob store. */

use {
    crate::{
        error::{DebianS3Error, Result},
        store::{BlobMetadata, BlobStore, BlobWrite, PutOptions},
    },
    async_trait::async_trait,
    rusoto_core::{ByteStream, Client, Region, RusotoError},
    rusoto_s3::{
        DeleteObjectRequest, GetObjectError, GetObjectRequest, HeadObjectError,
        HeadObjectRequest, PutObjectRequest, S3Client, S3,
    },
    std::collections::HashMap,
    tokio::io::AsyncReadExt,
};

/// Object metadata key holding the MD5 fingerprint of content.
const MD5_METADATA_KEY: &str = "md5";

fn store_error<E: std::fmt::Debug>(key: &str, e: RusotoError<E>) -> DebianS3Error {
    DebianS3Error::StoreUnavailable(key.to_string(), format!("S3 error: {:?}", e))
}

fn is_not_found<E>(e: &RusotoError<E>) -> bool {
    matches!(e, RusotoError::Unknown(response) if response.status.as_u16() == 404)
}

/// A [BlobStore] backed by an S3 bucket.
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    key_prefix: Option<String>,
    encryption: bool,
}

impl S3BlobStore {
    /// Create a new store bound to a named bucket with optional key prefix.
    ///
    /// This will construct a default AWS [Client].
    pub fn new(region: Region, bucket: impl ToString, key_prefix: Option<&str>) -> Self {
        Self {
            client: S3Client::new(region),
            bucket: bucket.to_string(),
            key_prefix: key_prefix.map(|x| x.trim_matches('/').to_string()),
            encryption: false,
        }
    }

    /// Create a new store bound to a named bucket, optional key prefix, with an AWS [Client].
    ///
    /// This is like [Self::new()] except the caller can pass in the AWS [Client] to use.
    pub fn new_with_client(
        client: Client,
        region: Region,
        bucket: impl ToString,
        key_prefix: Option<&str>,
    ) -> Self {
        Self {
            client: S3Client::new_with_client(client, region),
            bucket: bucket.to_string(),
            key_prefix: key_prefix.map(|x| x.trim_matches('/').to_string()),
            encryption: false,
        }
    }

    /// Request AES256 server side encryption on written objects.
    pub fn set_encryption(mut self, encryption: bool) -> Self {
        self.encryption = encryption;
        self
    }

    /// Compute the S3 key name given a repository relative path.
    pub fn path_to_key(&self, path: &str) -> String {
        key_with_prefix(self.key_prefix.as_deref(), path)
    }
}

fn key_with_prefix(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, path.trim_matches('/')),
        _ => path.trim_matches('/').to_string(),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn metadata(&self, key: &str) -> Result<Option<BlobMetadata>> {
        let req = HeadObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            ..Default::default()
        };

        match self.client.head_object(req).await {
            Ok(output) => Ok(Some(BlobMetadata {
                size: output.content_length.unwrap_or_default() as u64,
                etag: output.e_tag.map(|etag| etag.trim_matches('"').to_string()),
                md5: output
                    .metadata
                    .and_then(|mut metadata| metadata.remove(MD5_METADATA_KEY)),
            })),
            Err(RusotoError::Service(HeadObjectError::NoSuchKey(_))) => Ok(None),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(store_error(key, e)),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let req = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            ..Default::default()
        };

        match self.client.get_object(req).await {
            Ok(output) => {
                let mut buf = vec![];

                if let Some(body) = output.body {
                    body.into_async_read()
                        .read_to_end(&mut buf)
                        .await
                        .map_err(|e| DebianS3Error::RepositoryIoPath(key.to_string(), e))?;
                }

                Ok(Some(buf))
            }
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => Ok(None),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(store_error(key, e)),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, options: &PutOptions) -> Result<BlobWrite> {
        let bytes_written = data.len() as u64;
        let stream =
            futures::stream::once(async { Ok::<_, std::io::Error>(bytes::Bytes::from(data)) });

        let metadata = options.md5.as_ref().map(|md5| {
            let mut metadata = HashMap::new();
            metadata.insert(MD5_METADATA_KEY.to_string(), md5.clone());
            metadata
        });

        let req = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            body: Some(ByteStream::new(stream)),
            content_length: Some(bytes_written as i64),
            acl: Some(options.access_policy.as_ref().to_string()),
            content_type: Some(options.content_type.clone()),
            cache_control: options.cache_control.clone(),
            metadata,
            server_side_encryption: if self.encryption {
                Some("AES256".to_string())
            } else {
                None
            },
            ..Default::default()
        };

        self.client
            .put_object(req)
            .await
            .map_err(|e| store_error(key, e))?;

        Ok(BlobWrite {
            key: key.to_string(),
            bytes_written,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if !self.exists(key).await? {
            return Ok(());
        }

        let req = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            ..Default::default()
        };

        self.client
            .delete_object(req)
            .await
            .map_err(|e| store_error(key, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_prefixing() {
        assert_eq!(key_with_prefix(None, "dists/stable/Release"), "dists/stable/Release");
        assert_eq!(key_with_prefix(Some(""), "/pool/a.deb"), "pool/a.deb");
        assert_eq!(
            key_with_prefix(Some("apt"), "dists/stable/Release"),
            "apt/dists/stable/Release"
        );
    }
}
