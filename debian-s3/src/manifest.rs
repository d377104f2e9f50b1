// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binary package indices.

A [Manifest] holds the packages of one repository [Segment] and publishes its
`Packages` and `Packages.gz` index files along with any package payloads added
during the run.
*/

use {
    crate::{
        config::PublishConfig,
        control::split_paragraphs,
        error::{DebianS3Error, Result},
        io::{gzip_compress, FileChecksums},
        layout::Segment,
        package::PackageRecord,
        store::{read_text, store_blob, BlobStore, PutOptions, StoreOutcome},
    },
    std::collections::BTreeMap,
};

/// Content type of package payloads.
pub const DEB_CONTENT_TYPE: &str = "application/x-debian-package";

/// Content type of plain text index files.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type of gzip compressed index files.
pub const GZIP_CONTENT_TYPE: &str = "application/x-gzip";

/// Represents a publishing event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PublishEvent {
    /// Total number of pool artifacts to publish.
    PoolArtifactsToPublish(usize),

    /// A pool artifact with the given path is current and was not updated.
    PoolArtifactCurrent(String),

    /// A pool artifact with the given path and size was created.
    PoolArtifactCreated(String, u64),

    /// Pool artifact uploads were skipped for this many packages.
    PoolArtifactsSkipped(usize),

    /// The path to an index file to write.
    IndexFileToWrite(String),

    /// An index file at the given path already held identical content.
    IndexFileCurrent(String),

    /// An index file that was written.
    IndexFileWritten(String, u64),

    /// A stale file with the given path was removed.
    FileDeleted(String),
}

impl std::fmt::Display for PublishEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoolArtifactsToPublish(count) => {
                write!(f, "{} pool artifacts will be written", count)
            }
            Self::PoolArtifactCurrent(path) => {
                write!(f, "pool path {} is present", path)
            }
            Self::PoolArtifactCreated(path, size) => {
                write!(f, "wrote {} bytes to {}", size, path)
            }
            Self::PoolArtifactsSkipped(count) => {
                write!(f, "skipped upload of {} pool artifacts", count)
            }
            Self::IndexFileToWrite(path) => {
                write!(f, "index file {} will be written", path)
            }
            Self::IndexFileCurrent(path) => {
                write!(f, "index file {} is current", path)
            }
            Self::IndexFileWritten(path, size) => {
                write!(f, "wrote {} bytes to {}", size, path)
            }
            Self::FileDeleted(path) => {
                write!(f, "deleted {}", path)
            }
        }
    }
}

/// Report an event to the log and an optional progress callback.
pub(crate) fn emit<F>(progress_cb: &Option<F>, event: PublishEvent)
where
    F: Fn(PublishEvent),
{
    log::info!("{}", event);

    if let Some(cb) = progress_cb {
        cb(event);
    }
}

/// Write an index file, emitting progress events.
///
/// Returns checksums of the content for inclusion in a `Release` file.
pub(crate) async fn write_index_file<F>(
    store: &dyn BlobStore,
    path: &str,
    data: Vec<u8>,
    options: PutOptions,
    progress_cb: &Option<F>,
) -> Result<FileChecksums>
where
    F: Fn(PublishEvent),
{
    let checksums = FileChecksums::from_data(&data);

    emit(progress_cb, PublishEvent::IndexFileToWrite(path.to_string()));

    match store_blob(store, path, data, options, false).await? {
        StoreOutcome::Written(write) => emit(
            progress_cb,
            PublishEvent::IndexFileWritten(path.to_string(), write.bytes_written),
        ),
        StoreOutcome::Unchanged => {
            emit(progress_cb, PublishEvent::IndexFileCurrent(path.to_string()))
        }
    }

    Ok(checksums)
}

/// The package index of a repository segment.
#[derive(Clone, Debug)]
pub struct Manifest {
    segment: Segment,
    config: PublishConfig,
    packages: Vec<PackageRecord>,
    pending: Vec<PackageRecord>,
    files: BTreeMap<String, FileChecksums>,
}

impl Manifest {
    /// Construct an empty manifest.
    pub fn new(segment: Segment, config: &PublishConfig) -> Self {
        Self {
            segment,
            config: config.clone(),
            packages: vec![],
            pending: vec![],
            files: BTreeMap::new(),
        }
    }

    /// Construct a manifest from `Packages` index text.
    pub fn parse_packages(segment: Segment, config: &PublishConfig, text: &str) -> Result<Self> {
        let mut manifest = Self::new(segment, config);

        for para in split_paragraphs(text) {
            manifest.packages.push(PackageRecord::normalize(
                para,
                config.ignore_iteration_in_dependencies,
            )?);
        }

        Ok(manifest)
    }

    /// Load the manifest of a segment from a store.
    ///
    /// A missing `Packages` index yields an empty manifest.
    pub async fn retrieve(
        store: &dyn BlobStore,
        config: &PublishConfig,
        segment: Segment,
    ) -> Result<Self> {
        match read_text(store, &segment.packages_path()).await? {
            Some(text) => {
                let manifest = Self::parse_packages(segment, config, &text)?;
                log::debug!(
                    "retrieved {} packages from {}",
                    manifest.packages.len(),
                    manifest.segment
                );

                Ok(manifest)
            }
            None => Ok(Self::new(segment, config)),
        }
    }

    /// The segment this manifest indexes.
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn codename(&self) -> &str {
        &self.segment.codename
    }

    pub fn component(&self) -> &str {
        &self.segment.component
    }

    pub fn architecture(&self) -> &str {
        &self.segment.architecture
    }

    /// Packages in index order.
    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    /// Packages whose payloads will be uploaded by [Self::publish()].
    pub fn pending(&self) -> &[PackageRecord] {
        &self.pending
    }

    /// Checksums of index files written by [Self::publish()], keyed by path
    /// relative to `dists/<codename>/`.
    pub fn files(&self) -> &BTreeMap<String, FileChecksums> {
        &self.files
    }

    #[cfg(test)]
    pub(crate) fn set_files(&mut self, files: BTreeMap<String, FileChecksums>) {
        self.files = files;
    }

    /// Add a package, replacing existing entries for it.
    ///
    /// With `preserve_versions`, only entries with the same name and full version
    /// are replaced. Otherwise every entry with the same name is. When the
    /// configuration refuses overwrites, an existing entry with the same name,
    /// full version and payload file name fails with
    /// [DebianS3Error::DuplicatePackage].
    pub fn add(
        &mut self,
        pkg: PackageRecord,
        preserve_versions: bool,
        needs_upload: bool,
    ) -> Result<PackageRecord> {
        let full_version = pkg.full_version();

        if self.config.fail_if_exists {
            let basename = pkg.url_basename(self.codename())?;

            for existing in &self.packages {
                if existing.name == pkg.name
                    && existing.full_version() == full_version
                    && existing.url_basename(self.codename()).ok().as_ref() == Some(&basename)
                {
                    return Err(DebianS3Error::DuplicatePackage(
                        pkg.name.clone(),
                        full_version.unwrap_or_default(),
                        existing.url_filename(self.codename())?,
                    ));
                }
            }
        }

        if preserve_versions {
            self.packages
                .retain(|p| !(p.name == pkg.name && p.full_version() == full_version));
        } else {
            self.packages.retain(|p| p.name != pkg.name);
        }

        self.packages.push(pkg.clone());
        if needs_upload {
            self.pending.push(pkg.clone());
        }

        Ok(pkg)
    }

    /// Remove packages by name, optionally restricted to versions.
    ///
    /// A version string matches a package's bare version, its
    /// `version-iteration` or its full version. `None` or an empty list matches
    /// every version. Returns the removed packages.
    pub fn delete_package(&mut self, name: &str, versions: Option<&[String]>) -> Vec<PackageRecord> {
        let (removed, kept) = std::mem::take(&mut self.packages)
            .into_iter()
            .partition::<Vec<_>, _>(|p| {
                p.name == name
                    && match versions {
                        Some(versions) if !versions.is_empty() => p.matches_version(versions),
                        _ => true,
                    }
            });

        self.packages = kept;

        removed
    }

    /// Render the `Packages` index text.
    ///
    /// Stanzas are separated by an empty line.
    pub fn generate_index_text(&self) -> Result<String> {
        Ok(self
            .packages
            .iter()
            .map(|p| p.render(self.codename()))
            .collect::<Result<Vec<_>>>()?
            .join("\n"))
    }

    /// Publish pending payloads and the index files.
    ///
    /// Payloads are written before `Packages`, which is written before
    /// `Packages.gz`. Nothing is rolled back when a later write fails. Checksums of
    /// the index files are recorded in [Self::files()].
    pub async fn publish<F>(&mut self, store: &dyn BlobStore, progress_cb: &Option<F>) -> Result<()>
    where
        F: Fn(PublishEvent),
    {
        let pending = std::mem::take(&mut self.pending);

        if self.config.skip_package_upload {
            if !pending.is_empty() {
                emit(progress_cb, PublishEvent::PoolArtifactsSkipped(pending.len()));
            }
        } else {
            emit(progress_cb, PublishEvent::PoolArtifactsToPublish(pending.len()));

            for pkg in &pending {
                self.upload_payload(store, pkg, progress_cb).await?;
            }
        }

        let index = self.generate_index_text()?.into_bytes();
        let index_gz = gzip_compress(&index)?;

        let checksums = write_index_file(
            store,
            &self.segment.packages_path(),
            index,
            PutOptions::new(TEXT_CONTENT_TYPE, &self.config),
            progress_cb,
        )
        .await?;
        self.files
            .insert(self.segment.packages_relative_path(), checksums);

        let checksums = write_index_file(
            store,
            &self.segment.packages_gz_path(),
            index_gz,
            PutOptions::new(GZIP_CONTENT_TYPE, &self.config),
            progress_cb,
        )
        .await?;
        self.files
            .insert(self.segment.packages_gz_relative_path(), checksums);

        Ok(())
    }

    async fn upload_payload<F>(
        &self,
        store: &dyn BlobStore,
        pkg: &PackageRecord,
        progress_cb: &Option<F>,
    ) -> Result<()>
    where
        F: Fn(PublishEvent),
    {
        let path = pkg.url_filename(self.codename())?;
        let local_path = pkg
            .local_path
            .as_ref()
            .ok_or_else(|| DebianS3Error::PackagePayloadMissing(pkg.name.clone()))?;

        let data = async_std::fs::read(local_path)
            .await
            .map_err(|e| DebianS3Error::RepositoryIoPath(format!("{}", local_path.display()), e))?;

        match store_blob(
            store,
            &path,
            data,
            PutOptions::new(DEB_CONTENT_TYPE, &self.config),
            self.config.fail_if_exists,
        )
        .await?
        {
            StoreOutcome::Written(write) => emit(
                progress_cb,
                PublishEvent::PoolArtifactCreated(path, write.bytes_written),
            ),
            StoreOutcome::Unchanged => emit(progress_cb, PublishEvent::PoolArtifactCurrent(path)),
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            deb::{testutil::write_deb, DebControlExtractor},
            store::memory::MemoryBlobStore,
        },
        indoc::{formatdoc, indoc},
        std::{path::Path, sync::Mutex},
    };

    const PACKAGES: &str = include_str!("testdata/Packages");

    fn segment() -> Segment {
        Segment::new("stable", "main", "amd64")
    }

    fn no_progress() -> Option<fn(PublishEvent)> {
        None
    }

    fn deb(dir: &Path, name: &str, version: &str) -> Result<PackageRecord> {
        let control = formatdoc! {"
            Package: {name}
            Version: {version}
            Architecture: amd64
            Description: The {name} package.
            ",
            name = name,
            version = version,
        };
        let path = write_deb(dir, &format!("{}_{}_amd64.deb", name, version), &control);

        PackageRecord::from_deb_file(path, &DebControlExtractor, false)
    }

    fn names_and_versions(manifest: &Manifest) -> Vec<(String, String)> {
        manifest
            .packages()
            .iter()
            .map(|p| (p.name.clone(), p.full_version().unwrap_or_default()))
            .collect()
    }

    #[test]
    fn parse_index() -> Result<()> {
        let manifest = Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;

        assert_eq!(
            names_and_versions(&manifest),
            vec![
                ("discourse".to_string(), "1:1.0-1".to_string()),
                ("discourse".to_string(), "2.0.0".to_string()),
                ("redis-server".to_string(), "5:6.0.16-1".to_string()),
            ]
        );

        let pkg = &manifest.packages()[0];
        assert_eq!(
            pkg.storage_path.as_deref(),
            Some("pool/stable/d/di/discourse_1.0-1_amd64.deb")
        );
        assert_eq!(pkg.size, Some(2048));
        assert_eq!(pkg.license, "GPL-2.0");
        assert!(manifest.pending().is_empty());

        Ok(())
    }

    #[test]
    fn index_text_round_trip() -> Result<()> {
        let manifest = Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;

        assert_eq!(manifest.generate_index_text()?, PACKAGES);

        Ok(())
    }

    #[test]
    fn empty_index_text() {
        let manifest = Manifest::new(segment(), &PublishConfig::default());

        assert_eq!(manifest.generate_index_text().unwrap(), "");
    }

    #[test]
    fn add_preserving_versions() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manifest =
            Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;

        manifest.add(deb(td.path(), "discourse", "3.0.0")?, true, true)?;
        assert_eq!(
            manifest
                .packages()
                .iter()
                .filter(|p| p.name == "discourse")
                .count(),
            3
        );

        // Same full version replaces only that entry.
        manifest.add(deb(td.path(), "discourse", "2.0.0")?, true, true)?;
        assert_eq!(
            names_and_versions(&manifest),
            vec![
                ("discourse".to_string(), "1:1.0-1".to_string()),
                ("redis-server".to_string(), "5:6.0.16-1".to_string()),
                ("discourse".to_string(), "3.0.0".to_string()),
                ("discourse".to_string(), "2.0.0".to_string()),
            ]
        );
        assert_eq!(manifest.pending().len(), 2);

        Ok(())
    }

    #[test]
    fn add_replacing_versions() -> Result<()> {
        let td = tempfile::tempdir()?;
        let mut manifest =
            Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;

        manifest.add(deb(td.path(), "discourse", "3.0.0")?, false, false)?;
        assert_eq!(
            names_and_versions(&manifest),
            vec![
                ("redis-server".to_string(), "5:6.0.16-1".to_string()),
                ("discourse".to_string(), "3.0.0".to_string()),
            ]
        );
        assert!(manifest.pending().is_empty());

        Ok(())
    }

    #[test]
    fn add_duplicate_refused() -> Result<()> {
        let td = tempfile::tempdir()?;
        let config = PublishConfig {
            fail_if_exists: true,
            ..Default::default()
        };
        let mut manifest = Manifest::new(segment(), &config);

        manifest.add(deb(td.path(), "myapp", "1.0-1")?, false, true)?;
        let res = manifest.add(deb(td.path(), "myapp", "1.0-1")?, false, true);
        assert!(matches!(
            res,
            Err(DebianS3Error::DuplicatePackage(name, version, path))
                if name == "myapp"
                    && version == "1.0-1"
                    && path == "pool/stable/m/my/myapp_1.0-1_amd64.deb"
        ));

        let rebuilt = write_deb(
            td.path(),
            "myapp_1.0-1_amd64+rebuild1.deb",
            indoc! {"
                Package: myapp
                Version: 1.0-1
                Architecture: amd64
                Description: The myapp package.
            "},
        );
        let pkg = manifest.add(
            PackageRecord::from_deb_file(rebuilt, &DebControlExtractor, false)?,
            false,
            true,
        )?;
        assert_eq!(
            pkg.url_filename("stable")?,
            "pool/stable/m/my/myapp_1.0-1_amd64+rebuild1.deb"
        );
        assert_eq!(manifest.packages().len(), 1);

        manifest.add(deb(td.path(), "myapp", "1.0-2")?, false, true)?;
        assert_eq!(manifest.packages().len(), 1);

        Ok(())
    }

    #[test]
    fn delete_by_version() -> Result<()> {
        let mut manifest =
            Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;

        let removed = manifest.delete_package(
            "discourse",
            Some(&["1:1.0-1".to_string(), "2.0.0".to_string()]),
        );
        assert_eq!(removed.len(), 2);
        assert_eq!(
            names_and_versions(&manifest),
            vec![("redis-server".to_string(), "5:6.0.16-1".to_string())]
        );

        Ok(())
    }

    #[test]
    fn delete_matches_version_forms() -> Result<()> {
        let mut manifest =
            Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;

        assert!(manifest
            .delete_package("discourse", Some(&["1.0".to_string()]))
            .iter()
            .all(|p| p.version.as_deref() == Some("1.0")));
        assert_eq!(manifest.packages().len(), 2);

        let mut manifest =
            Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;
        assert_eq!(
            manifest
                .delete_package("discourse", Some(&["1.0-1".to_string()]))
                .len(),
            1
        );

        let mut manifest =
            Manifest::parse_packages(segment(), &PublishConfig::default(), PACKAGES)?;
        assert!(manifest
            .delete_package("redis-server", Some(&["1.0-1".to_string()]))
            .is_empty());
        assert_eq!(manifest.packages().len(), 3);

        assert_eq!(manifest.delete_package("discourse", None).len(), 2);
        assert_eq!(manifest.delete_package("nope", None).len(), 0);
        assert_eq!(manifest.packages().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn retrieve_missing_is_empty() -> Result<()> {
        let store = MemoryBlobStore::default();
        let manifest = Manifest::retrieve(&store, &PublishConfig::default(), segment()).await?;

        assert!(manifest.packages().is_empty());
        assert!(manifest.files().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn publish_writes_payloads_and_indices() -> Result<()> {
        let td = tempfile::tempdir()?;
        let store = MemoryBlobStore::default();
        let config = PublishConfig::default();
        let mut manifest = Manifest::new(segment(), &config);

        let pkg = manifest.add(deb(td.path(), "myapp", "1.0-1")?, false, true)?;

        let events = Mutex::new(vec![]);
        let cb = |event: PublishEvent| events.lock().unwrap().push(event);
        manifest.publish(&store, &Some(cb)).await?;

        assert_eq!(
            store.keys(),
            vec![
                "dists/stable/main/binary-amd64/Packages",
                "dists/stable/main/binary-amd64/Packages.gz",
                "pool/stable/m/my/myapp_1.0-1_amd64.deb",
            ]
        );
        assert_eq!(
            store
                .put_options("pool/stable/m/my/myapp_1.0-1_amd64.deb")
                .unwrap()
                .content_type,
            DEB_CONTENT_TYPE
        );
        assert_eq!(
            store
                .put_options("dists/stable/main/binary-amd64/Packages")
                .unwrap()
                .content_type,
            TEXT_CONTENT_TYPE
        );
        assert_eq!(
            store
                .put_options("dists/stable/main/binary-amd64/Packages.gz")
                .unwrap()
                .content_type,
            GZIP_CONTENT_TYPE
        );

        let index = store.get("dists/stable/main/binary-amd64/Packages").unwrap();
        assert_eq!(index, pkg.render("stable")?.into_bytes());
        assert!(String::from_utf8(index.clone())
            .unwrap()
            .contains("Filename: pool/stable/m/my/myapp_1.0-1_amd64.deb\n"));

        let checksums = &manifest.files()["main/binary-amd64/Packages"];
        assert_eq!(checksums, &FileChecksums::from_data(&index));
        assert!(manifest
            .files()
            .contains_key("main/binary-amd64/Packages.gz"));
        assert!(manifest.pending().is_empty());

        let events = events.into_inner().unwrap();
        assert_eq!(events[0], PublishEvent::PoolArtifactsToPublish(1));
        assert!(matches!(&events[1], PublishEvent::PoolArtifactCreated(path, _)
            if path == "pool/stable/m/my/myapp_1.0-1_amd64.deb"));

        Ok(())
    }

    #[tokio::test]
    async fn republish_is_noop() -> Result<()> {
        let td = tempfile::tempdir()?;
        let store = MemoryBlobStore::default();
        let config = PublishConfig {
            fail_if_exists: true,
            ..Default::default()
        };

        let pkg = deb(td.path(), "myapp", "1.0-1")?;

        let mut manifest = Manifest::new(segment(), &config);
        manifest.add(pkg.clone(), false, true)?;
        manifest.publish(&store, &no_progress()).await?;
        let writes = store.write_count();

        let mut manifest = Manifest::new(segment(), &config);
        manifest.add(pkg, false, true)?;
        manifest.publish(&store, &no_progress()).await?;
        assert_eq!(store.write_count(), writes);

        Ok(())
    }

    #[tokio::test]
    async fn payload_drift_refused() -> Result<()> {
        let td = tempfile::tempdir()?;
        let store = MemoryBlobStore::default();
        let config = PublishConfig {
            fail_if_exists: true,
            ..Default::default()
        };

        let mut manifest = Manifest::new(segment(), &config);
        manifest.add(deb(td.path(), "myapp", "1.0-1")?, false, true)?;
        manifest.publish(&store, &no_progress()).await?;

        let path = write_deb(
            td.path(),
            "myapp_1.0-1_amd64.deb",
            indoc! {"
                Package: myapp
                Version: 1.0-1
                Architecture: amd64
                Description: Rebuilt with different content.
            "},
        );
        let mut manifest = Manifest::new(segment(), &config);
        manifest.add(
            PackageRecord::from_deb_file(path, &DebControlExtractor, false)?,
            false,
            true,
        )?;

        let res = manifest.publish(&store, &no_progress()).await;
        assert!(matches!(res, Err(DebianS3Error::AlreadyExists(path))
            if path == "pool/stable/m/my/myapp_1.0-1_amd64.deb"));

        Ok(())
    }

    #[tokio::test]
    async fn skip_package_upload() -> Result<()> {
        let td = tempfile::tempdir()?;
        let store = MemoryBlobStore::default();
        let config = PublishConfig {
            skip_package_upload: true,
            ..Default::default()
        };

        let mut manifest = Manifest::new(segment(), &config);
        manifest.add(deb(td.path(), "myapp", "1.0-1")?, false, true)?;
        manifest.publish(&store, &no_progress()).await?;

        assert_eq!(
            store.keys(),
            vec![
                "dists/stable/main/binary-amd64/Packages",
                "dists/stable/main/binary-amd64/Packages.gz",
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn retrieve_published() -> Result<()> {
        let td = tempfile::tempdir()?;
        let store = MemoryBlobStore::default();
        let config = PublishConfig::default();

        let mut manifest = Manifest::new(segment(), &config);
        manifest.add(deb(td.path(), "myapp", "1.0-1")?, false, true)?;
        manifest.add(deb(td.path(), "other", "2.0")?, false, true)?;
        manifest.publish(&store, &no_progress()).await?;

        let retrieved = Manifest::retrieve(&store, &config, segment()).await?;
        assert_eq!(
            names_and_versions(&retrieved),
            vec![
                ("myapp".to_string(), "1.0-1".to_string()),
                ("other".to_string(), "2.0".to_string()),
            ]
        );
        assert_eq!(
            retrieved.packages()[0].storage_path.as_deref(),
            Some("pool/stable/m/my/myapp_1.0-1_amd64.deb")
        );
        assert_eq!(
            retrieved.generate_index_text()?,
            manifest.generate_index_text()?
        );

        Ok(())
    }
}
