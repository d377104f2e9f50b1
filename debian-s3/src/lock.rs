// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Optimistic advisory locking of repository segments.

Blob stores offer no locking primitive, so a lock is a blob at the segment's
`lockfile` key holding the holder identity and a random nonce:

```text
user@host
<hex nonce>
```

Acquisition writes unconditionally and reads the blob back. If the content read
differs from what was written, another process raced in and won. This detects a
lost race only when the store provides read-your-write consistency; under
weaker consistency a stale read of our own write looks like success.

The lock is advisory. Nothing prevents a process from publishing without it.
*/

use {
    crate::{
        config::PublishConfig,
        error::{DebianS3Error, Result},
        layout::Segment,
        store::{read_text, store_blob, BlobStore, PutOptions},
    },
    rand::RngCore,
    std::{
        fmt::{Display, Formatter},
        time::Duration,
    },
};

/// Identity of a lock holder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockHolder {
    pub user: String,
    pub host: Option<String>,
}

impl LockHolder {
    /// Resolve the identity of the current process.
    ///
    /// The user comes from `USER` or `LOGNAME`, falling back to the passwd entry of
    /// the effective uid. The host is the system hostname.
    pub fn current() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .ok()
            .filter(|user| !user.is_empty())
            .or_else(|| {
                nix::unistd::User::from_uid(nix::unistd::geteuid())
                    .ok()
                    .flatten()
                    .map(|user| user.name)
            })
            .unwrap_or_else(|| "unknown".to_string());

        let host = nix::unistd::gethostname()
            .ok()
            .and_then(|host| host.into_string().ok());

        Self { user, host }
    }

    /// Parse the holder from lock content.
    ///
    /// The first line holds `user@host`.
    pub fn parse(content: &str) -> Option<Self> {
        let first = content.split_whitespace().next()?;

        Some(match first.split_once('@') {
            Some((user, host)) => Self {
                user: user.to_string(),
                host: Some(host.to_string()),
            },
            None => Self {
                user: first.to_string(),
                host: None,
            },
        })
    }
}

impl Display for LockHolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{}@{}", self.user, host),
            None => write!(f, "{}", self.user),
        }
    }
}

/// Content of a lock blob.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockRecord {
    pub holder: LockHolder,
    pub nonce: String,
}

impl LockRecord {
    /// Create a record for a holder with a fresh random nonce.
    pub fn new(holder: LockHolder) -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        Self {
            holder,
            nonce: hex::encode(nonce),
        }
    }

    /// The blob content of this record.
    pub fn content(&self) -> String {
        format!("{}\n{}", self.holder, self.nonce)
    }
}

/// Manages segment locks in a [BlobStore].
pub struct SegmentLock<'a> {
    store: &'a dyn BlobStore,
    config: &'a PublishConfig,
    holder: LockHolder,
}

impl<'a> SegmentLock<'a> {
    /// Construct an instance acting as the current process.
    pub fn new(store: &'a dyn BlobStore, config: &'a PublishConfig) -> Self {
        Self::with_holder(store, config, LockHolder::current())
    }

    /// Construct an instance acting as an explicit holder.
    pub fn with_holder(
        store: &'a dyn BlobStore,
        config: &'a PublishConfig,
        holder: LockHolder,
    ) -> Self {
        Self {
            store,
            config,
            holder,
        }
    }

    /// The identity locks are acquired as.
    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }

    /// Whether a segment is locked.
    pub async fn is_locked(&self, segment: &Segment) -> Result<bool> {
        self.store.exists(&segment.lock_path()).await
    }

    /// Acquire the lock of a segment.
    ///
    /// This does not wait for an existing holder. Call [Self::wait_for()] first.
    /// Fails with [DebianS3Error::LockConflict] when another writer overwrote our
    /// lock content.
    pub async fn acquire(&self, segment: &Segment) -> Result<LockRecord> {
        let path = segment.lock_path();
        let record = LockRecord::new(self.holder.clone());
        let content = record.content();

        store_blob(
            self.store,
            &path,
            content.clone().into_bytes(),
            PutOptions::new("text/plain", self.config),
            false,
        )
        .await?;

        match read_text(self.store, &path).await? {
            Some(stored) if stored == content => {
                log::info!("acquired lock {} as {}", path, self.holder);
                Ok(record)
            }
            _ => Err(DebianS3Error::LockConflict(path)),
        }
    }

    /// Wait for a segment to become unlocked.
    ///
    /// Polls up to the configured number of attempts, sleeping the configured
    /// interval between polls. Fails with [DebianS3Error::LockTimeout] when the
    /// lock is still held after the last attempt.
    pub async fn wait_for(&self, segment: &Segment) -> Result<()> {
        let max_attempts = self.config.lock_wait_attempts;
        let interval = Duration::from_secs(self.config.lock_wait_interval_secs);
        let mut attempts = 0;

        while self.is_locked(segment).await? {
            attempts += 1;

            if attempts > max_attempts {
                return Err(DebianS3Error::LockTimeout(
                    segment.lock_path(),
                    max_attempts,
                ));
            }

            match self.current_holder(segment).await? {
                Some(holder) => log::warn!(
                    "{} is locked by {}; waiting {}s",
                    segment,
                    holder,
                    interval.as_secs()
                ),
                None => log::warn!("{} is locked; waiting {}s", segment, interval.as_secs()),
            }

            tokio::time::sleep(interval).await;
        }

        Ok(())
    }

    /// Release the lock of a segment.
    ///
    /// The lock is removed regardless of who holds it.
    pub async fn release(&self, segment: &Segment) -> Result<()> {
        self.store.delete(&segment.lock_path()).await?;
        log::info!("released lock {}", segment.lock_path());

        Ok(())
    }

    /// Obtain the current holder of a segment lock, if locked.
    pub async fn current_holder(&self, segment: &Segment) -> Result<Option<LockHolder>> {
        Ok(read_text(self.store, &segment.lock_path())
            .await?
            .and_then(|content| LockHolder::parse(&content)))
    }
}
