// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interfaces for `.deb` package files.

A `.deb` is an `ar` archive holding a `debian-binary` marker, a `control.tar`
archive with package metadata and a `data.tar` archive with installed files.
The tar archives may be compressed.
*/

use {
    crate::error::{DebianS3Error, Result},
    std::{
        io::{Cursor, Read},
        path::Path,
    },
};

/// Compression format of a `control.tar` or `data.tar` archive member.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebCompression {
    /// No compression (no extension).
    Uncompressed,

    /// Gzip compression (`.gz`).
    Gzip,

    /// XZ compression (`.xz`).
    Xz,

    /// Zstandard compression (`.zst`).
    Zstandard,
}

impl DebCompression {
    /// Resolve the compression of an archive member from its file name.
    ///
    /// `prefix` is the uncompressed name, e.g. `control.tar`.
    pub fn from_member_name(prefix: &str, name: &str) -> Result<Self> {
        match name.strip_prefix(prefix) {
            Some("") => Ok(Self::Uncompressed),
            Some(".gz") => Ok(Self::Gzip),
            Some(".xz") => Ok(Self::Xz),
            Some(".zst") => Ok(Self::Zstandard),
            _ => Err(DebianS3Error::DebUnknownCompression(name.to_string())),
        }
    }

    /// The filename extension for this compression format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Uncompressed => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
            Self::Zstandard => ".zst",
        }
    }

    /// Obtain a reader yielding decompressed content.
    pub fn decompress<'a>(&self, data: &'a [u8]) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::Uncompressed => Box::new(Cursor::new(data)),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(Cursor::new(data))?),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(Cursor::new(data))),
            Self::Zstandard => Box::new(zstd::stream::read::Decoder::new(Cursor::new(data))?),
        })
    }
}

/// Obtains the raw control text of a package archive.
pub trait ControlExtractor {
    /// Extract the text of the `control` file from the archive at `path`.
    fn extract_control_text(&self, path: &Path) -> Result<String>;
}

/// A [ControlExtractor] reading `.deb` files in process.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebControlExtractor;

impl DebControlExtractor {
    /// Extract the control text from `.deb` content held in memory.
    pub fn extract_from_reader(&self, reader: impl Read) -> Result<String> {
        let mut archive = ar::Archive::new(reader);

        while let Some(entry) = archive.next_entry() {
            let mut entry = entry?;

            let name = String::from_utf8_lossy(entry.header().identifier())
                .trim_end_matches('/')
                .to_string();

            if !name.starts_with("control.tar") {
                continue;
            }

            let compression = DebCompression::from_member_name("control.tar", &name)?;

            let mut data = vec![];
            entry.read_to_end(&mut data)?;

            return control_from_tar(compression.decompress(&data)?);
        }

        Err(DebianS3Error::ControlFileNotFound)
    }
}

impl ControlExtractor for DebControlExtractor {
    fn extract_control_text(&self, path: &Path) -> Result<String> {
        let fh = std::fs::File::open(path)
            .map_err(|e| DebianS3Error::RepositoryIoPath(format!("{}", path.display()), e))?;

        self.extract_from_reader(std::io::BufReader::new(fh))
    }
}

fn control_from_tar(reader: impl Read) -> Result<String> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;

        let is_control = {
            let path = entry.path()?;
            path.as_os_str() == "./control" || path.as_os_str() == "control"
        };

        if is_control {
            let mut data = vec![];
            entry.read_to_end(&mut data)?;

            return String::from_utf8(data).map_err(|e| {
                DebianS3Error::ControlParseError(format!("control file is not UTF-8: {}", e))
            });
        }
    }

    Err(DebianS3Error::ControlFileNotFound)
}

/// Builds minimal `.deb` files for tests.
#[cfg(test)]
pub(crate) mod testutil {
    use {super::*, std::io::Write};

    fn tar_with_files(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mtime(0);
            builder.append_data(&mut header, path, *data).unwrap();
        }

        builder.into_inner().unwrap()
    }

    fn compress(compression: DebCompression, data: Vec<u8>) -> Vec<u8> {
        match compression {
            DebCompression::Uncompressed => data,
            DebCompression::Gzip => crate::io::gzip_compress(&data).unwrap(),
            DebCompression::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
                encoder.write_all(&data).unwrap();
                encoder.finish().unwrap()
            }
            DebCompression::Zstandard => zstd::stream::encode_all(Cursor::new(data), 3).unwrap(),
        }
    }

    /// Produce `.deb` content with the given control file text.
    pub fn deb_with_control(control: Option<&str>, compression: DebCompression) -> Vec<u8> {
        let mut ar_builder = ar::Builder::new(Vec::new());

        let members = [
            ("debian-binary".to_string(), b"2.0\n".to_vec()),
            (
                format!("control.tar{}", compression.extension()),
                compress(
                    compression,
                    match control {
                        Some(text) => tar_with_files(&[("./control", text.as_bytes())]),
                        None => tar_with_files(&[("./md5sums", b"")]),
                    },
                ),
            ),
            (
                format!("data.tar{}", compression.extension()),
                compress(compression, tar_with_files(&[("./usr/bin/app", b"42")])),
            ),
        ];

        for (name, data) in members {
            let mut header = ar::Header::new(name.into_bytes(), data.len() as _);
            header.set_mode(0o644);
            header.set_uid(0);
            header.set_gid(0);
            ar_builder.append(&header, data.as_slice()).unwrap();
        }

        ar_builder.into_inner().unwrap()
    }

    /// Write `.deb` content to `dir/filename`, returning the path.
    pub fn write_deb(dir: &Path, filename: &str, control: &str) -> std::path::PathBuf {
        let path = dir.join(filename);
        std::fs::write(&path, deb_with_control(Some(control), DebCompression::Gzip)).unwrap();

        path
    }
}
