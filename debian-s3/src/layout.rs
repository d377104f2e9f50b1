// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository key layout.

```text
dists/<codename>/Release
dists/<codename>/InRelease
dists/<codename>/Release.gpg
dists/<codename>/<component>/binary-<arch>/Packages
dists/<codename>/<component>/binary-<arch>/Packages.gz
dists/<codename>/<component>/binary-<arch>/lockfile
pool/<codename>/<first letter>/<first two letters>/<basename>
```
*/

use std::fmt::{Display, Formatter};

/// Path of the `Release` file of a codename.
pub fn release_path(codename: &str) -> String {
    format!("dists/{}/Release", codename)
}

/// Path of the cleartext signed `InRelease` file of a codename.
pub fn in_release_path(codename: &str) -> String {
    format!("dists/{}/InRelease", codename)
}

/// Path of the detached `Release` signature of a codename.
pub fn release_gpg_path(codename: &str) -> String {
    format!("dists/{}/Release.gpg", codename)
}

/// Compute the pool path of a package payload.
///
/// Payloads are partitioned by the first letter and the first two letters of the
/// package name.
pub fn pool_path(codename: &str, name: &str, basename: &str) -> String {
    let first = name.chars().take(1).collect::<String>();
    let first_two = name.chars().take(2).collect::<String>();

    format!("pool/{}/{}/{}/{}", codename, first, first_two, basename)
}

/// A (codename, component, architecture) slice of a repository.
///
/// Package indices and locks are scoped to a segment.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Segment {
    pub codename: String,
    pub component: String,
    pub architecture: String,
}

impl Segment {
    pub fn new(codename: impl ToString, component: impl ToString, architecture: impl ToString) -> Self {
        Self {
            codename: codename.to_string(),
            component: component.to_string(),
            architecture: architecture.to_string(),
        }
    }

    /// Path of the binary index directory, relative to `dists/<codename>/`.
    fn binary_dir(&self) -> String {
        format!("{}/binary-{}", self.component, self.architecture)
    }

    /// Path of `Packages`, relative to `dists/<codename>/`.
    ///
    /// This is the form used in `Release` file hash tables.
    pub fn packages_relative_path(&self) -> String {
        format!("{}/Packages", self.binary_dir())
    }

    /// Path of `Packages.gz`, relative to `dists/<codename>/`.
    pub fn packages_gz_relative_path(&self) -> String {
        format!("{}/Packages.gz", self.binary_dir())
    }

    /// Path of the `Packages` index.
    pub fn packages_path(&self) -> String {
        format!("dists/{}/{}", self.codename, self.packages_relative_path())
    }

    /// Path of the `Packages.gz` index.
    pub fn packages_gz_path(&self) -> String {
        format!("dists/{}/{}", self.codename, self.packages_gz_relative_path())
    }

    /// Path of the lock file.
    pub fn lock_path(&self) -> String {
        format!("dists/{}/{}/lockfile", self.codename, self.binary_dir())
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.codename, self.component, self.architecture)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn segment_paths() {
        let segment = Segment::new("stable", "main", "amd64");

        assert_eq!(segment.packages_relative_path(), "main/binary-amd64/Packages");
        assert_eq!(
            segment.packages_gz_relative_path(),
            "main/binary-amd64/Packages.gz"
        );
        assert_eq!(
            segment.packages_path(),
            "dists/stable/main/binary-amd64/Packages"
        );
        assert_eq!(
            segment.packages_gz_path(),
            "dists/stable/main/binary-amd64/Packages.gz"
        );
        assert_eq!(
            segment.lock_path(),
            "dists/stable/main/binary-amd64/lockfile"
        );
        assert_eq!(segment.to_string(), "stable/main/amd64");
    }

    #[test]
    fn release_paths() {
        assert_eq!(release_path("stable"), "dists/stable/Release");
        assert_eq!(in_release_path("stable"), "dists/stable/InRelease");
        assert_eq!(release_gpg_path("stable"), "dists/stable/Release.gpg");
    }

    #[test]
    fn pool_paths() {
        assert_eq!(
            pool_path("stable", "discourse", "discourse_1.0_amd64.deb"),
            "pool/stable/d/di/discourse_1.0_amd64.deb"
        );
        assert_eq!(pool_path("stable", "x", "x.deb"), "pool/stable/x/x/x.deb");
    }
}
