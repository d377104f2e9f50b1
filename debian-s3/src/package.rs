// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Normalized binary package metadata.

A [PackageRecord] is built either from the control file of a `.deb` archive or
from a stanza of a published `Packages` index. Well-known fields are lifted into
named attributes; everything else lands in an extension field map.
*/

use {
    crate::{
        control::ControlParagraph,
        deb::ControlExtractor,
        dependency::{normalize_dependency_expression, parse_depends, DependencyRewrite},
        error::{DebianS3Error, Result},
        io::FileChecksums,
        layout::pool_path,
        package_version::{format_full_version, PackageVersion},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
        str::FromStr,
    },
};

/// Prefix marking user-defined fields destined for binary, changes or source files.
static RE_USER_FIELD_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^X[BCS]{0,3}-").unwrap());

/// Relationship fields retained verbatim, in the order they are rendered.
pub const RELATIONSHIP_FIELDS: &[&str] = &[
    "Pre-Depends",
    "Recommends",
    "Suggests",
    "Enhances",
    "Breaks",
    "Conflicts",
    "Provides",
    "Replaces",
];

const DEFAULT_LICENSE: &str = "unknown";
const DEFAULT_VENDOR: &str = "none";
const DEFAULT_DESCRIPTION: &str = "no description given";

/// Normalized metadata for a single binary package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageRecord {
    pub name: String,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub iteration: Option<String>,
    pub architecture: Option<String>,
    pub maintainer: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub license: String,
    pub vendor: String,
    pub url: Option<String>,
    pub priority: Option<String>,
    pub origin: Option<String>,
    pub installed_size: Option<String>,
    /// Normalized `Depends` entries.
    pub dependencies: Vec<String>,
    /// Conflicts derived from `!=` dependency constraints.
    pub conflicts: Vec<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub md5: Option<String>,
    pub size: Option<u64>,
    /// Path of the payload within the repository, as recorded in `Filename`.
    pub storage_path: Option<String>,
    /// Filesystem path of the `.deb` payload this record was built from.
    pub local_path: Option<PathBuf>,
    /// Unrecognized and relationship fields, keyed by field name.
    pub fields: BTreeMap<String, String>,
}

impl PackageRecord {
    /// Construct an instance with the given name and no other metadata.
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            epoch: None,
            version: None,
            iteration: None,
            architecture: None,
            maintainer: None,
            description: None,
            category: None,
            license: DEFAULT_LICENSE.to_string(),
            vendor: DEFAULT_VENDOR.to_string(),
            url: None,
            priority: None,
            origin: None,
            installed_size: None,
            dependencies: vec![],
            conflicts: vec![],
            sha1: None,
            sha256: None,
            md5: None,
            size: None,
            storage_path: None,
            local_path: None,
            fields: BTreeMap::new(),
        }
    }

    /// Parse control text into a normalized record.
    pub fn from_control(text: &str, ignore_iteration: bool) -> Result<Self> {
        Self::normalize(ControlParagraph::parse_str(text), ignore_iteration)
    }

    /// Normalize a parsed control paragraph.
    ///
    /// Fields of published index entries (`Filename`, `Size` and digests) are lifted
    /// when present.
    pub fn normalize(mut para: ControlParagraph, ignore_iteration: bool) -> Result<Self> {
        let version = para.take_field("Version").unwrap_or_default();
        let (epoch, version, iteration) = PackageVersion::parse(&version)?.into_parts();

        let name = para
            .take_field("Package")
            .ok_or(DebianS3Error::ControlRequiredFieldMissing("Package"))?;

        let mut pkg = Self::new(name);
        pkg.epoch = epoch;
        pkg.version = Some(version);
        pkg.iteration = iteration;

        pkg.architecture = para.take_field("Architecture");
        pkg.category = para.take_field("Section");
        if let Some(license) = para.take_field("License") {
            pkg.license = license;
        }
        pkg.maintainer = para.take_field("Maintainer");
        pkg.url = para.take_field("Homepage");
        if let Some(vendor) = para.take_field("Vendor") {
            pkg.vendor = vendor;
        }
        pkg.priority = para.take_field("Priority");
        pkg.origin = para.take_field("Origin");
        pkg.installed_size = para.take_field("Installed-Size");

        pkg.storage_path = para.take_field("Filename");
        pkg.sha1 = para.take_field("SHA1");
        pkg.sha256 = para.take_field("SHA256");
        pkg.md5 = para.take_field("MD5sum");
        pkg.size = para
            .take_field("Size")
            .map(|s| u64::from_str(s.trim()))
            .transpose()?;
        pkg.description = para.take_field("Description");

        if let Some(depends) = para.take_field("Depends") {
            for dep in parse_depends(&depends) {
                match normalize_dependency_expression(&dep, ignore_iteration) {
                    DependencyRewrite::Depends(deps) => pkg.dependencies.extend(deps),
                    DependencyRewrite::Conflicts(conflict) => pkg.conflicts.push(conflict),
                }
            }
        }

        for name in RELATIONSHIP_FIELDS {
            if let Some(value) = para.take_field(name) {
                pkg.fields.insert(name.to_string(), value);
            }
        }

        for field in para.into_fields() {
            let name = RE_USER_FIELD_PREFIX.replace(field.name(), "").to_string();
            pkg.fields.insert(name, field.into_value());
        }

        Ok(pkg)
    }

    /// Build a record from a `.deb` archive on the filesystem.
    ///
    /// The control text is obtained through `extractor`. Size and digests are
    /// computed from the archive content.
    pub fn from_deb_file(
        path: impl AsRef<Path>,
        extractor: &dyn ControlExtractor,
        ignore_iteration: bool,
    ) -> Result<Self> {
        let path = path.as_ref();

        let control = extractor.extract_control_text(path)?;
        let mut pkg = Self::from_control(&control, ignore_iteration)?;
        pkg.apply_file_info(path)?;
        pkg.local_path = Some(path.to_path_buf());

        Ok(pkg)
    }

    /// Record size and digests of the payload at `path`.
    pub fn apply_file_info(&mut self, path: &Path) -> Result<()> {
        let checksums = FileChecksums::from_path(path)
            .map_err(|e| DebianS3Error::RepositoryIoPath(format!("{}", path.display()), e))?;

        self.size = Some(checksums.size);
        self.sha1 = checksums.sha1;
        self.sha256 = checksums.sha256;
        self.md5 = checksums.md5;

        Ok(())
    }

    /// The `[epoch:]version[-iteration]` string, if any part is set.
    pub fn full_version(&self) -> Option<String> {
        format_full_version(
            self.epoch.as_deref(),
            self.version.as_deref(),
            self.iteration.as_deref(),
        )
    }

    /// Whether any of `versions` names this record's version.
    ///
    /// A version string matches the bare version, `version-iteration` or the full
    /// version.
    pub fn matches_version(&self, versions: &[String]) -> bool {
        let version = self.version.as_deref().unwrap_or_default();
        let with_iteration = format!(
            "{}-{}",
            version,
            self.iteration.as_deref().unwrap_or_default()
        );
        let full_version = self.full_version();

        versions.iter().any(|v| {
            v == version || v == &with_iteration || Some(v) == full_version.as_ref()
        })
    }

    /// Path of the payload within the repository.
    ///
    /// Records parsed from an index keep their recorded `Filename`. Otherwise the
    /// pool path is derived from the name and the local payload's file name.
    pub fn url_filename(&self, codename: &str) -> Result<String> {
        if let Some(path) = &self.storage_path {
            return Ok(path.clone());
        }

        let basename = self
            .local_path
            .as_ref()
            .and_then(|p| p.file_name())
            .ok_or_else(|| DebianS3Error::PackagePayloadMissing(self.name.clone()))?;

        Ok(pool_path(
            codename,
            &self.name,
            &basename.to_string_lossy(),
        ))
    }

    /// The file name component of [Self::url_filename].
    pub fn url_basename(&self, codename: &str) -> Result<String> {
        let path = self.url_filename(codename)?;

        Ok(match path.rsplit_once('/') {
            Some((_, basename)) => basename.to_string(),
            None => path,
        })
    }

    /// Render this record as a `Packages` index stanza.
    pub fn to_paragraph(&self, codename: &str) -> Result<ControlParagraph> {
        let mut para = ControlParagraph::default();

        para.set_field_from_string("Package", &self.name);
        if let Some(version) = self.full_version() {
            para.set_field_from_string("Version", version);
        }
        para.set_field_from_string("License", &self.license);
        para.set_field_from_string("Vendor", &self.vendor);

        let optional = [
            ("Architecture", &self.architecture),
            ("Maintainer", &self.maintainer),
            ("Installed-Size", &self.installed_size),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                para.set_field_from_string(name, value);
            }
        }

        if !self.dependencies.is_empty() {
            para.set_field_from_string("Depends", self.dependencies.join(", "));
        }

        for name in RELATIONSHIP_FIELDS {
            let mut values = self
                .fields
                .get(*name)
                .map(|v| vec![v.clone()])
                .unwrap_or_default();
            if *name == "Conflicts" {
                values.extend(self.conflicts.iter().cloned());
            }

            if !values.is_empty() {
                para.set_field_from_string(name, values.join(", "));
            }
        }

        let optional = [
            ("Section", &self.category),
            ("Origin", &self.origin),
            ("Priority", &self.priority),
            ("Homepage", &self.url),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                para.set_field_from_string(name, value);
            }
        }

        para.set_field_from_string("Filename", self.url_filename(codename)?);

        if let Some(size) = self.size {
            para.set_field_from_string("Size", size);
        }
        let digests = [
            ("SHA1", &self.sha1),
            ("SHA256", &self.sha256),
            ("MD5sum", &self.md5),
        ];
        for (name, value) in digests {
            if let Some(value) = value {
                para.set_field_from_string(name, value);
            }
        }

        for (name, value) in &self.fields {
            if !RELATIONSHIP_FIELDS.contains(&name.as_str()) {
                para.set_field_from_string(name, value);
            }
        }

        para.set_field_from_string(
            "Description",
            self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION),
        );

        Ok(para)
    }

    /// Render this record as `Packages` index text.
    pub fn render(&self, codename: &str) -> Result<String> {
        Ok(self.to_paragraph(codename)?.to_string())
    }
}
