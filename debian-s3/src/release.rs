// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file handling.

A [Release] describes one codename of a repository: its architectures, its
components and checksums of every index file. Manifests are folded into it with
[Release::update_manifest()] before it is published.
*/

use {
    crate::{
        config::PublishConfig,
        error::Result,
        io::{ChecksumType, FileChecksums},
        layout::{in_release_path, release_gpg_path, release_path, Segment},
        manifest::{emit, write_index_file, Manifest, PublishEvent, TEXT_CONTENT_TYPE},
        signing::ReleaseSigner,
        store::{read_text, BlobStore, PutOptions},
    },
    chrono::{DateTime, Utc},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{collections::BTreeMap, fmt},
};

/// Formatter string for the `Date` field.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// Content type of signatures.
pub const SIGNATURE_CONTENT_TYPE: &str = "application/pgp-signature; charset=us-ascii";

/// Architectures every component advertises an index for.
pub const DEFAULT_ARCHITECTURES: &[&str] = &["amd64", "i386", "armhf"];

static RE_HASH_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]+(\S+)[ \t]+(\d+)[ \t]+(.+?)[ \t\r]*$").unwrap());

/// Find the value of a `Field: value` line.
fn parse_field<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}: ", name);

    text.lines()
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|value| value.trim_end())
}

/// The `Release` file of a codename.
#[derive(Clone, Debug)]
pub struct Release {
    codename: String,
    origin: Option<String>,
    suite: Option<String>,
    architectures: Vec<String>,
    components: Vec<String>,
    files: BTreeMap<String, FileChecksums>,
    config: PublishConfig,
    date: Option<DateTime<Utc>>,
}

impl Release {
    /// Construct an empty instance.
    pub fn new(codename: impl ToString, config: &PublishConfig) -> Self {
        Self {
            codename: codename.to_string(),
            origin: config.origin.clone(),
            suite: config.suite.clone(),
            architectures: vec![],
            components: vec![],
            files: BTreeMap::new(),
            config: config.clone(),
            date: None,
        }
    }

    /// Parse `Release` file text.
    ///
    /// Checksum lines for the same path accumulate into one entry. Lines whose
    /// digest length matches no known checksum only record the size.
    pub fn parse(text: &str, config: &PublishConfig) -> Self {
        let mut release = Self::new(
            parse_field(text, "Codename").unwrap_or_default(),
            config,
        );
        release.origin = parse_field(text, "Origin").map(|x| x.to_string());
        release.suite = parse_field(text, "Suite").map(|x| x.to_string());
        release.architectures = parse_field(text, "Architectures")
            .map(|x| x.split_whitespace().map(|x| x.to_string()).collect())
            .unwrap_or_default();
        release.components = parse_field(text, "Components")
            .map(|x| x.split_whitespace().map(|x| x.to_string()).collect())
            .unwrap_or_default();

        for caps in RE_HASH_LINE.captures_iter(text) {
            let digest = &caps[1];
            let size = match caps[2].parse::<u64>() {
                Ok(size) => size,
                Err(_) => continue,
            };

            let entry = release
                .files
                .entry(caps[3].to_string())
                .or_insert_with(|| FileChecksums {
                    size,
                    ..Default::default()
                });

            if let Some(checksum) = ChecksumType::from_hex_len(digest.len()) {
                entry.set_digest(checksum, digest);
            }
        }

        release
    }

    /// Load the `Release` file of a codename from a store.
    ///
    /// A missing file yields an empty instance. Configured origin and suite take
    /// precedence over stored values.
    pub async fn retrieve(
        store: &dyn BlobStore,
        config: &PublishConfig,
        codename: &str,
    ) -> Result<Self> {
        let mut release = match read_text(store, &release_path(codename)).await? {
            Some(text) => Self::parse(&text, config),
            None => Self::new(codename, config),
        };

        release.codename = codename.to_string();
        if let Some(origin) = &config.origin {
            release.origin = Some(origin.clone());
        }
        if let Some(suite) = &config.suite {
            release.suite = Some(suite.clone());
        }

        Ok(release)
    }

    pub fn codename(&self) -> &str {
        &self.codename
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn suite(&self) -> Option<&str> {
        self.suite.as_deref()
    }

    /// Architectures in first-insertion order.
    pub fn architectures(&self) -> &[String] {
        &self.architectures
    }

    /// Components in first-insertion order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Checksums of index files, keyed by path relative to `dists/<codename>/`.
    pub fn files(&self) -> &BTreeMap<String, FileChecksums> {
        &self.files
    }

    /// Set the time written to the `Date` field.
    ///
    /// Defaults to the current time when rendering.
    pub fn set_date(&mut self, date: DateTime<Utc>) {
        self.date = Some(date);
    }

    fn add_component(&mut self, component: &str) {
        if !self.components.iter().any(|c| c == component) {
            self.components.push(component.to_string());
        }
    }

    fn add_architecture(&mut self, architecture: &str) {
        if !self.architectures.iter().any(|a| a == architecture) {
            self.architectures.push(architecture.to_string());
        }
    }

    /// Fold a published manifest into this release.
    ///
    /// The manifest's component and architecture are added if not yet present.
    /// Its file checksums replace existing entries for the same paths.
    pub fn update_manifest(&mut self, manifest: &Manifest) {
        self.add_component(manifest.component());
        self.add_architecture(manifest.architecture());

        for (path, checksums) in manifest.files() {
            self.files.insert(path.clone(), checksums.clone());
        }
    }

    /// Publish empty indices for default architectures lacking one.
    ///
    /// Every component gets a `Packages` index for each of
    /// [DEFAULT_ARCHITECTURES] so clients configured for them find an index.
    pub async fn validate_others<F>(
        &mut self,
        store: &dyn BlobStore,
        progress_cb: &Option<F>,
    ) -> Result<()>
    where
        F: Fn(PublishEvent),
    {
        let mut manifests = vec![];

        for component in &self.components {
            for arch in DEFAULT_ARCHITECTURES {
                let segment = Segment::new(&self.codename, component, arch);

                if self.files.contains_key(&segment.packages_relative_path()) {
                    continue;
                }

                log::info!("publishing empty index for {}", segment);
                let mut manifest = Manifest::new(segment, &self.config);
                manifest.publish(store, progress_cb).await?;
                manifests.push(manifest);
            }
        }

        for manifest in &manifests {
            self.update_manifest(manifest);
        }

        Ok(())
    }

    /// Render the `Release` file text.
    pub fn generate(&self) -> String {
        self.to_string()
    }

    /// Publish the `Release` file and its signatures.
    ///
    /// Empty indices are first published via [Self::validate_others()]. With a
    /// signer, `InRelease` and `Release.gpg` are written. Without one, a stale
    /// `Release.gpg` is deleted.
    pub async fn publish<F>(
        &mut self,
        store: &dyn BlobStore,
        signer: Option<&dyn ReleaseSigner>,
        progress_cb: &Option<F>,
    ) -> Result<()>
    where
        F: Fn(PublishEvent),
    {
        self.validate_others(store, progress_cb).await?;

        let text = self.generate();

        write_index_file(
            store,
            &release_path(&self.codename),
            text.clone().into_bytes(),
            PutOptions::new(TEXT_CONTENT_TYPE, &self.config),
            progress_cb,
        )
        .await?;

        match signer {
            Some(signer) => {
                let in_release = signer.clear_sign(text.as_bytes())?;
                write_index_file(
                    store,
                    &in_release_path(&self.codename),
                    in_release,
                    PutOptions::new(SIGNATURE_CONTENT_TYPE, &self.config),
                    progress_cb,
                )
                .await?;

                let signature = signer.detached_sign(text.as_bytes())?;
                write_index_file(
                    store,
                    &release_gpg_path(&self.codename),
                    signature,
                    PutOptions::new(SIGNATURE_CONTENT_TYPE, &self.config),
                    progress_cb,
                )
                .await?;
            }
            None => {
                let path = release_gpg_path(&self.codename);

                if store.exists(&path).await? {
                    store.delete(&path).await?;
                    emit(progress_cb, PublishEvent::FileDeleted(path));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self.date.unwrap_or_else(Utc::now);

        if let Some(origin) = &self.origin {
            writeln!(f, "Origin: {}", origin)?;
            writeln!(f, "Label: {}", origin)?;
        }
        writeln!(f, "Codename: {}", self.codename)?;
        writeln!(f, "Date: {}", date.format(DATE_FORMAT))?;
        writeln!(f, "Architectures: {}", self.architectures.join(" "))?;
        writeln!(f, "Components: {}", self.components.join(" "))?;
        if let Some(suite) = &self.suite {
            writeln!(f, "Suite: {}", suite)?;
        }

        for checksum in ChecksumType::release_order() {
            writeln!(f, "{}:", checksum.field_name())?;

            for (path, checksums) in &self.files {
                if let Some(digest) = checksums.digest(checksum) {
                    writeln!(f, " {} {:>16} {}", digest, checksums.size, path)?;
                }
            }
        }

        Ok(())
    }
}
