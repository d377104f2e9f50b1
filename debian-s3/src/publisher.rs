// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Publishing runs.

A [Publisher] ties the pieces together: it optionally locks the target segment,
retrieves the current manifests and `Release` file from the store, mutates them
and publishes the result. Every run starts from current store state, so a run
that failed part way converges when repeated.
*/

use {
    crate::{
        config::PublishConfig,
        deb::{ControlExtractor, DebControlExtractor},
        error::{DebianS3Error, Result},
        layout::Segment,
        lock::{LockHolder, SegmentLock},
        manifest::{Manifest, PublishEvent},
        package::PackageRecord,
        release::{Release, DEFAULT_ARCHITECTURES},
        signing::ReleaseSigner,
        store::BlobStore,
    },
    std::{
        collections::{btree_map::Entry, BTreeMap, BTreeSet},
        future::Future,
        path::Path,
    },
};

/// Architecture of packages installable on every architecture.
pub const ARCHITECTURE_ALL: &str = "all";

/// Publishes packages to a repository held in a [BlobStore].
pub struct Publisher<'a> {
    store: &'a dyn BlobStore,
    config: PublishConfig,
    signer: Option<&'a dyn ReleaseSigner>,
    extractor: &'a dyn ControlExtractor,
    holder: LockHolder,
}

impl<'a> Publisher<'a> {
    /// Construct an instance writing to a store.
    ///
    /// `Release` files are not signed until a signer is set.
    pub fn new(store: &'a dyn BlobStore, config: PublishConfig) -> Self {
        Self {
            store,
            config,
            signer: None,
            extractor: &DebControlExtractor,
            holder: LockHolder::current(),
        }
    }

    /// Sign `Release` files with a signer.
    pub fn with_signer(mut self, signer: &'a dyn ReleaseSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Obtain control files of `.deb` archives with an extractor.
    pub fn with_extractor(mut self, extractor: &'a dyn ControlExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Acquire locks as an explicit holder.
    pub fn with_lock_holder(mut self, holder: LockHolder) -> Self {
        self.holder = holder;
        self
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Run a future while holding the lock of a segment, if locking is enabled.
    ///
    /// The lock is released whether or not the future succeeds. A lock that was not
    /// acquired is left alone.
    async fn locked<T>(&self, segment: &Segment, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if !self.config.lock {
            return fut.await;
        }

        let lock = SegmentLock::with_holder(self.store, &self.config, self.holder.clone());
        lock.wait_for(segment).await?;
        lock.acquire(segment).await?;

        let res = fut.await;
        let released = lock.release(segment).await;

        let value = res?;
        released?;

        Ok(value)
    }

    /// Upload `.deb` archives to a component of a codename.
    ///
    /// Without an explicit `architecture`, each package goes to the architecture in
    /// its control file. Packages for architecture `all` are also listed in the
    /// index of every other known architecture; their payload is uploaded once.
    ///
    /// The run locks the segment of `architecture`, or of `all` when none is given.
    /// That lock only covers the `all` index: uploads without an architecture are
    /// not serialized against uploads naming a specific architecture, even though
    /// both modify that architecture's index.
    ///
    /// Returns the added packages.
    pub async fn upload<P, F>(
        &self,
        debs: &[P],
        codename: &str,
        component: &str,
        architecture: Option<&str>,
        progress_cb: &Option<F>,
    ) -> Result<Vec<PackageRecord>>
    where
        P: AsRef<Path>,
        F: Fn(PublishEvent),
    {
        let segment = Segment::new(
            codename,
            component,
            architecture.unwrap_or(ARCHITECTURE_ALL),
        );

        self.locked(
            &segment,
            self.upload_unlocked(debs, codename, component, architecture, progress_cb),
        )
        .await
    }

    async fn upload_unlocked<P, F>(
        &self,
        debs: &[P],
        codename: &str,
        component: &str,
        architecture: Option<&str>,
        progress_cb: &Option<F>,
    ) -> Result<Vec<PackageRecord>>
    where
        P: AsRef<Path>,
        F: Fn(PublishEvent),
    {
        let mut release = Release::retrieve(self.store, &self.config, codename).await?;
        let mut manifests = BTreeMap::<String, Manifest>::new();
        let mut added = vec![];
        let mut arch_all = vec![];

        for path in debs {
            let path = path.as_ref();
            log::info!("examining package {}", path.display());

            let pkg = PackageRecord::from_deb_file(
                path,
                self.extractor,
                self.config.ignore_iteration_in_dependencies,
            )?;

            let arch = match architecture.or(pkg.architecture.as_deref()) {
                Some(arch) => arch.to_string(),
                None => {
                    return Err(DebianS3Error::ArchitectureUnknown(format!(
                        "{}",
                        path.display()
                    )))
                }
            };

            let manifest = self
                .manifest(&mut manifests, codename, component, &arch)
                .await?;
            let pkg = manifest.add(pkg, self.config.preserve_versions, true)?;

            if arch == ARCHITECTURE_ALL {
                arch_all.push(pkg.clone());
            }
            added.push(pkg);
        }

        if !arch_all.is_empty() {
            let mut targets = release
                .architectures()
                .iter()
                .chain(manifests.keys())
                .filter(|arch| arch.as_str() != ARCHITECTURE_ALL)
                .cloned()
                .collect::<BTreeSet<_>>();
            if targets.is_empty() {
                targets = DEFAULT_ARCHITECTURES.iter().map(|x| x.to_string()).collect();
            }

            for arch in targets {
                let manifest = self
                    .manifest(&mut manifests, codename, component, &arch)
                    .await?;

                for pkg in &arch_all {
                    manifest.add(pkg.clone(), self.config.preserve_versions, false)?;
                }
            }
        }

        for manifest in manifests.values_mut() {
            manifest.publish(self.store, progress_cb).await?;
            release.update_manifest(manifest);
        }

        release.publish(self.store, self.signer, progress_cb).await?;

        Ok(added)
    }

    /// Obtain the manifest of an architecture, retrieving it on first use.
    async fn manifest<'m>(
        &self,
        manifests: &'m mut BTreeMap<String, Manifest>,
        codename: &str,
        component: &str,
        arch: &str,
    ) -> Result<&'m mut Manifest> {
        Ok(match manifests.entry(arch.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let manifest = Manifest::retrieve(
                    self.store,
                    &self.config,
                    Segment::new(codename, component, arch),
                )
                .await?;

                entry.insert(manifest)
            }
        })
    }

    /// Remove a package from a component of a codename.
    ///
    /// `versions` restricts removal to matching versions; an empty list removes
    /// every version. Architecture `all` removes the package from every
    /// architecture listed in the `Release` file. Payloads are left in the pool.
    ///
    /// Fails with [DebianS3Error::PackageNotFound] when nothing matched.
    pub async fn delete<F>(
        &self,
        name: &str,
        versions: &[String],
        codename: &str,
        component: &str,
        architecture: &str,
        progress_cb: &Option<F>,
    ) -> Result<Vec<PackageRecord>>
    where
        F: Fn(PublishEvent),
    {
        let segment = Segment::new(codename, component, architecture);

        self.locked(
            &segment,
            self.delete_unlocked(name, versions, codename, component, architecture, progress_cb),
        )
        .await
    }

    async fn delete_unlocked<F>(
        &self,
        name: &str,
        versions: &[String],
        codename: &str,
        component: &str,
        architecture: &str,
        progress_cb: &Option<F>,
    ) -> Result<Vec<PackageRecord>>
    where
        F: Fn(PublishEvent),
    {
        let mut release = Release::retrieve(self.store, &self.config, codename).await?;

        let architectures = if architecture == ARCHITECTURE_ALL {
            release.architectures().to_vec()
        } else {
            vec![architecture.to_string()]
        };

        let mut removed = vec![];

        for arch in architectures {
            let mut manifest = Manifest::retrieve(
                self.store,
                &self.config,
                Segment::new(codename, component, &arch),
            )
            .await?;

            let deleted = manifest.delete_package(name, Some(versions));
            if deleted.is_empty() {
                log::warn!(
                    "no packages named {} found in {}; skipping",
                    name,
                    manifest.segment()
                );
                continue;
            }

            for pkg in &deleted {
                log::info!(
                    "removing {} {} from {}",
                    pkg.name,
                    pkg.full_version().unwrap_or_default(),
                    manifest.segment()
                );
            }

            manifest.publish(self.store, progress_cb).await?;
            release.update_manifest(&manifest);
            removed.extend(deleted);
        }

        if removed.is_empty() {
            return Err(DebianS3Error::PackageNotFound(name.to_string()));
        }

        release.publish(self.store, self.signer, progress_cb).await?;

        Ok(removed)
    }
}
