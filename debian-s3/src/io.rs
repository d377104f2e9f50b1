// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    digest::Digest,
    std::{io::Write, path::Path},
};

/// Checksum type / digest mechanism used in `Release` and `Packages` files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl ChecksumType {
    /// Emit variants in the order they are written to `Release` files.
    pub fn release_order() -> impl Iterator<Item = ChecksumType> {
        [Self::Md5, Self::Sha1, Self::Sha256].into_iter()
    }

    /// Name of the control field in `Release` files holding this variant type.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Resolve the checksum flavor of a hex digest from its length.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Md5),
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Size and hex digests of a file.
///
/// Digests are optional because entries parsed from a `Release` file accumulate one
/// digest flavor at a time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileChecksums {
    pub size: u64,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
}

impl FileChecksums {
    /// Compute size and all digests of in-memory content.
    pub fn from_data(data: &[u8]) -> Self {
        let mut digester = MultiDigester::default();
        digester.update(data);
        digester.finish(data.len() as u64)
    }

    /// Compute size and all digests of a file on the filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut fh = std::fs::File::open(path.as_ref())?;
        let mut digester = MultiDigester::default();
        let size = std::io::copy(&mut fh, &mut digester)?;

        Ok(digester.finish(size))
    }

    /// Obtain the hex digest for a given [ChecksumType].
    pub fn digest(&self, checksum: ChecksumType) -> Option<&str> {
        match checksum {
            ChecksumType::Md5 => self.md5.as_deref(),
            ChecksumType::Sha1 => self.sha1.as_deref(),
            ChecksumType::Sha256 => self.sha256.as_deref(),
        }
    }

    /// Set the hex digest for a given [ChecksumType].
    pub fn set_digest(&mut self, checksum: ChecksumType, hex_digest: impl ToString) {
        let value = Some(hex_digest.to_string());

        match checksum {
            ChecksumType::Md5 => self.md5 = value,
            ChecksumType::Sha1 => self.sha1 = value,
            ChecksumType::Sha256 => self.sha256 = value,
        }
    }
}

/// A content digester that simultaneously computes multiple digest types.
#[derive(Default)]
pub struct MultiDigester {
    md5: md5::Md5,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Finish digesting content.
    ///
    /// Consumes the instance and returns [FileChecksums] for content of `size` bytes.
    pub fn finish(self, size: u64) -> FileChecksums {
        FileChecksums {
            size,
            md5: Some(hex::encode(self.md5.finalize())),
            sha1: Some(hex::encode(self.sha1.finalize())),
            sha256: Some(hex::encode(self.sha256.finalize())),
        }
    }
}

impl Write for MultiDigester {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Compute the hex MD5 of content.
///
/// This is the fingerprint stored alongside blobs to detect content drift.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

/// Gzip compress content.
pub fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = libflate::gzip::Encoder::new(Vec::new())?;
    encoder.write_all(data)?;

    encoder.finish().into_result()
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Read};

    #[test]
    fn checksums_of_empty_content() {
        let checksums = FileChecksums::from_data(b"");

        assert_eq!(checksums.size, 0);
        assert_eq!(
            checksums.md5.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert_eq!(
            checksums.sha1.as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
        assert_eq!(
            checksums.sha256.as_deref(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn checksums_from_path_match_in_memory() -> std::io::Result<()> {
        let mut fh = tempfile::NamedTempFile::new()?;
        fh.write_all(b"hello world")?;
        fh.flush()?;

        assert_eq!(
            FileChecksums::from_path(fh.path())?,
            FileChecksums::from_data(b"hello world")
        );
        assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");

        Ok(())
    }

    #[test]
    fn checksum_type_from_len() {
        assert_eq!(ChecksumType::from_hex_len(32), Some(ChecksumType::Md5));
        assert_eq!(ChecksumType::from_hex_len(40), Some(ChecksumType::Sha1));
        assert_eq!(ChecksumType::from_hex_len(64), Some(ChecksumType::Sha256));
        assert_eq!(ChecksumType::from_hex_len(12), None);
    }

    #[test]
    fn gzip_decompresses() -> std::io::Result<()> {
        let compressed = gzip_compress(b"Package: foo\n")?;

        let mut decoder = libflate::gzip::Decoder::new(std::io::Cursor::new(compressed))?;
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        assert_eq!(out, "Package: foo\n");

        Ok(())
    }
}
