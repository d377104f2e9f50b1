// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling.

Versions have the form `[epoch:]version[-iteration]`. The iteration (the Debian
revision) begins at the first hyphen following the version.
*/

use {
    crate::error::{DebianS3Error, Result},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

static RE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:([0-9]+):)?(\S+?)(?:-(\S*))?$").unwrap());

/// A Debian package version split into its components.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PackageVersion {
    epoch: Option<String>,
    version: String,
    iteration: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    ///
    /// Fails with [DebianS3Error::MalformedVersion] on empty strings and strings
    /// containing whitespace.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_VERSION
            .captures(s)
            .ok_or_else(|| DebianS3Error::MalformedVersion(s.to_string()))?;

        Ok(Self {
            epoch: caps.get(1).map(|m| m.as_str().to_string()),
            version: caps[2].to_string(),
            iteration: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }

    /// The epoch component, if present.
    pub fn epoch(&self) -> Option<&str> {
        self.epoch.as_deref()
    }

    /// The upstream version component.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The iteration (Debian revision) component, if present.
    pub fn iteration(&self) -> Option<&str> {
        self.iteration.as_deref()
    }

    /// Consume self and return the `(epoch, version, iteration)` parts.
    pub fn into_parts(self) -> (Option<String>, String, Option<String>) {
        (self.epoch, self.version, self.iteration)
    }
}

impl FromStr for PackageVersion {
    type Err = DebianS3Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = format_full_version(
            self.epoch.as_deref(),
            Some(self.version.as_str()),
            self.iteration.as_deref(),
        )
        .unwrap_or_default();

        f.write_str(&s)
    }
}

/// Assemble `[epoch:]version[-iteration]` from optional parts.
///
/// Absent epoch or version parts are omitted along with their separator. The
/// iteration is always preceded by `-`. Returns [None] when every part is absent.
pub fn format_full_version(
    epoch: Option<&str>,
    version: Option<&str>,
    iteration: Option<&str>,
) -> Option<String> {
    if epoch.is_none() && version.is_none() && iteration.is_none() {
        return None;
    }

    let head = [epoch, version].into_iter().flatten().collect::<Vec<_>>();
    let mut s = head.join(":");

    if let Some(iteration) = iteration {
        s.push('-');
        s.push_str(iteration);
    }

    Some(s)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_all_components() -> Result<()> {
        let v = PackageVersion::parse("2:1.0.0-3")?;
        assert_eq!(v.epoch(), Some("2"));
        assert_eq!(v.version(), "1.0.0");
        assert_eq!(v.iteration(), Some("3"));
        assert_eq!(v.to_string(), "2:1.0.0-3");

        Ok(())
    }

    #[test]
    fn parse_version_only() -> Result<()> {
        let v = PackageVersion::from_str("1.0.0")?;
        assert_eq!(v.epoch(), None);
        assert_eq!(v.version(), "1.0.0");
        assert_eq!(v.iteration(), None);
        assert_eq!(v.to_string(), "1.0.0");

        Ok(())
    }

    #[test]
    fn iteration_starts_at_first_hyphen() -> Result<()> {
        let v = PackageVersion::parse("1.2-beta-4")?;
        assert_eq!(v.version(), "1.2");
        assert_eq!(v.iteration(), Some("beta-4"));

        Ok(())
    }

    #[test]
    fn non_numeric_epoch_is_part_of_version() -> Result<()> {
        let v = PackageVersion::parse("abc:1.0")?;
        assert_eq!(v.epoch(), None);
        assert_eq!(v.version(), "abc:1.0");

        Ok(())
    }

    #[test]
    fn round_trips() -> Result<()> {
        for s in ["1", "1:1", "1.0-1", "3:4.5.6-ubuntu1", "0.9~rc1", "1:2.0-"] {
            assert_eq!(PackageVersion::parse(s)?.to_string(), s);
        }

        Ok(())
    }

    #[test]
    fn malformed() {
        for s in ["", "1.0 2", " ", "1:2 -3"] {
            assert!(
                matches!(PackageVersion::parse(s), Err(DebianS3Error::MalformedVersion(_))),
                "{}",
                s
            );
        }
    }

    #[test]
    fn full_version_formatting() {
        assert_eq!(format_full_version(None, None, None), None);
        assert_eq!(
            format_full_version(Some("1"), Some("2.0"), Some("3")),
            Some("1:2.0-3".to_string())
        );
        assert_eq!(
            format_full_version(None, Some("2.0"), None),
            Some("2.0".to_string())
        );
        assert_eq!(
            format_full_version(Some("1"), None, None),
            Some("1".to_string())
        );
        assert_eq!(
            format_full_version(None, None, Some("3")),
            Some("-3".to_string())
        );
    }
}
