// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Publishing configuration. */

use {
    serde::{Deserialize, Serialize},
    strum::{AsRefStr, EnumIter, EnumString},
};

/// Default number of times to poll a held lock before giving up.
pub const DEFAULT_LOCK_WAIT_ATTEMPTS: u32 = 60;

/// Default number of seconds between polls of a held lock.
pub const DEFAULT_LOCK_WAIT_INTERVAL_SECS: u64 = 10;

/// Canned access policy applied to written blobs.
///
/// String forms match S3 canned ACL names.
#[derive(
    AsRefStr, Clone, Copy, Debug, Deserialize, EnumIter, EnumString, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AccessPolicy {
    Private,
    PublicRead,
    AuthenticatedRead,
    BucketOwnerFullControl,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::PublicRead
    }
}

/// Settings governing a publish run.
///
/// All fields are optional when deserializing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Value of `Origin` in `Release` files. Overrides the stored value.
    pub origin: Option<String>,

    /// Value of `Suite` in `Release` files. Overrides the stored value.
    pub suite: Option<String>,

    /// `Cache-Control` to set on written blobs.
    pub cache_control: Option<String>,

    /// Access policy to set on written blobs.
    pub visibility: AccessPolicy,

    /// Refuse to overwrite packages and payloads with different content.
    pub fail_if_exists: bool,

    /// Don't upload package payloads; only update indices.
    pub skip_package_upload: bool,

    /// Keep other versions of a package when adding a new version.
    pub preserve_versions: bool,

    /// Rewrite exact `=` dependencies into ranges ignoring the iteration.
    pub ignore_iteration_in_dependencies: bool,

    /// Hold the segment lock while publishing.
    pub lock: bool,

    /// Times to poll a held lock before giving up.
    pub lock_wait_attempts: u32,

    /// Seconds between polls of a held lock.
    pub lock_wait_interval_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            origin: None,
            suite: None,
            cache_control: None,
            visibility: AccessPolicy::default(),
            fail_if_exists: false,
            skip_package_upload: false,
            preserve_versions: false,
            ignore_iteration_in_dependencies: false,
            lock: false,
            lock_wait_attempts: DEFAULT_LOCK_WAIT_ATTEMPTS,
            lock_wait_interval_secs: DEFAULT_LOCK_WAIT_INTERVAL_SECS,
        }
    }
}
