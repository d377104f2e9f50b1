// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Publish Debian APT repositories to shared object stores.

This crate maintains a Debian package repository whose metadata lives in a key/value
blob store such as Amazon S3. Multiple independent processes may publish to the same
repository. The store is the only thing they share.

# A Tour of Functionality

Repository state is accessed through the [store::BlobStore] trait.
[store::s3::S3BlobStore] (behind the `s3` feature) writes to an S3 bucket,
[store::filesystem::FilesystemBlobStore] to a local directory and
[store::memory::MemoryBlobStore] to process memory. [store::store_blob()] performs
writes that skip identical content and detect content drift.

The [control] module parses and renders control files: paragraphs of `Name: value`
fields. [package::PackageRecord] is the normalized metadata of a binary package, built
from the control file of a `.deb` archive (see [deb]) or from a stanza of a published
`Packages` index. Version strings are handled by [package_version] and dependency
expressions are normalized by [dependency].

A repository is partitioned into [layout::Segment]s: a component and architecture
within a codename. [manifest::Manifest] is the package index of a segment. It uploads
package payloads to the pool and writes `Packages` and `Packages.gz`.
[release::Release] aggregates the checksums of every index of a codename into the
`Release` file, optionally signed by a [signing::ReleaseSigner] such as
[signing::GpgSigner].

Concurrent publishers coordinate through the advisory, optimistic lock in [lock].

[publisher::Publisher] runs complete upload and delete operations: lock, retrieve,
mutate, publish, unlock.

Publishing behavior is configured by [config::PublishConfig].

# Crate Features

The enabled-by-default `s3` feature provides the S3 blob store.
*/

pub mod config;
pub mod control;
pub mod deb;
pub mod dependency;
pub mod error;
pub mod io;
pub mod layout;
pub mod lock;
pub mod manifest;
pub mod package;
pub mod package_version;
pub mod publisher;
pub mod release;
pub mod signing;
pub mod store;
