// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing of `Release` files. */

use {
    crate::error::{DebianS3Error, Result},
    std::{
        io::{BufRead, BufReader},
        path::Path,
    },
};

/// Produces OpenPGP signatures of `Release` content.
pub trait ReleaseSigner: Sync {
    /// Produce a cleartext signed copy of content, as published in `InRelease`.
    fn clear_sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Produce an armored detached signature of content, as published in `Release.gpg`.
    fn detached_sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// A [ReleaseSigner] invoking the `gpg` executable.
///
/// Content is written to a temporary file and `gpg` writes its output next to it
/// with an `.asc` extension.
#[derive(Clone, Debug)]
pub struct GpgSigner {
    program: String,
    key: Option<String>,
    options: Vec<String>,
}

impl GpgSigner {
    /// Construct an instance signing with the given key, or gpg's default key.
    pub fn new(key: Option<String>) -> Self {
        Self {
            program: "gpg".to_string(),
            key: key.filter(|key| !key.is_empty()),
            options: vec![],
        }
    }

    /// Set the executable to run.
    pub fn with_program(mut self, program: impl ToString) -> Self {
        self.program = program.to_string();
        self
    }

    /// Set extra arguments passed to every invocation.
    pub fn with_options(mut self, options: impl IntoIterator<Item = impl ToString>) -> Self {
        self.options = options.into_iter().map(|x| x.to_string()).collect();
        self
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["-a".to_string()];

        if let Some(key) = &self.key {
            args.push(format!("--default-key={}", key));
        }

        args.push("--digest-algo".to_string());
        args.push("SHA256".to_string());
        args.extend(self.options.iter().cloned());

        args
    }

    /// Arguments for producing a cleartext signature of `path`.
    pub fn clear_sign_args(&self, path: &Path) -> Vec<String> {
        let mut args = self.base_args();
        args.push("-s".to_string());
        args.push("--clearsign".to_string());
        args.push(path.display().to_string());

        args
    }

    /// Arguments for producing a detached signature of `path`.
    pub fn detached_sign_args(&self, path: &Path) -> Vec<String> {
        let mut args = self.base_args();
        args.push("-b".to_string());
        args.push(path.display().to_string());

        args
    }

    fn run(&self, data: &[u8], args: impl Fn(&Path) -> Vec<String>, what: &str) -> Result<Vec<u8>> {
        let td = tempfile::Builder::new()
            .prefix("debian-s3-sign-")
            .tempdir()?;
        let path = td.path().join("Release");
        std::fs::write(&path, data)?;

        let args = args(&path);
        log::debug!("invoking {} with args: {:?}", self.program, args);

        let command = duct::cmd(&self.program, &args)
            .stderr_to_stdout()
            .unchecked()
            .reader()
            .map_err(|e| {
                DebianS3Error::SigningFailure(format!("running {}: {}", self.program, e))
            })?;
        {
            let reader = BufReader::new(&command);
            for line in reader.lines() {
                log::warn!("{}", line?);
            }
        }

        let output = command.try_wait()?.ok_or_else(|| {
            DebianS3Error::SigningFailure(format!("unable to wait on {}", self.program))
        })?;
        if !output.status.success() {
            return Err(DebianS3Error::SigningFailure(format!(
                "{} of the Release file failed",
                what
            )));
        }

        let signature_path = td.path().join("Release.asc");
        if !signature_path.exists() {
            return Err(DebianS3Error::SigningFailure(format!(
                "unable to locate {} output {}",
                what,
                signature_path.display()
            )));
        }

        Ok(std::fs::read(&signature_path)?)
    }
}

impl ReleaseSigner for GpgSigner {
    fn clear_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.run(data, |path| self.clear_sign_args(path), "cleartext signing")
    }

    fn detached_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.run(data, |path| self.detached_sign_args(path), "detached signing")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_arguments() {
        let path = Path::new("/tmp/Release");

        assert_eq!(
            GpgSigner::new(None).clear_sign_args(path),
            vec!["-a", "--digest-algo", "SHA256", "-s", "--clearsign", "/tmp/Release"]
        );
        assert_eq!(
            GpgSigner::new(Some(String::new())).detached_sign_args(path),
            vec!["-a", "--digest-algo", "SHA256", "-b", "/tmp/Release"]
        );
        assert_eq!(
            GpgSigner::new(Some("ABCD1234".to_string()))
                .with_options(["--batch", "--yes"])
                .detached_sign_args(path),
            vec![
                "-a",
                "--default-key=ABCD1234",
                "--digest-algo",
                "SHA256",
                "--batch",
                "--yes",
                "-b",
                "/tmp/Release"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_signer() {
        let signer = GpgSigner::new(None).with_program("false");

        assert!(matches!(
            signer.clear_sign(b"Origin: x\n"),
            Err(DebianS3Error::SigningFailure(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn missing_signature() {
        let signer = GpgSigner::new(None).with_program("true");

        assert!(matches!(
            signer.detached_sign(b"Origin: x\n"),
            Err(DebianS3Error::SigningFailure(msg)) if msg.contains("unable to locate")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn reads_signature_output() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let td = tempfile::tempdir()?;
        let script = td.path().join("fake-gpg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\n{ echo SIGNED; cat \"$last\"; } > \"$last.asc\"\n",
        )?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let signer = GpgSigner::new(None).with_program(script.display());

        assert_eq!(signer.clear_sign(b"Origin: x\n")?, b"SIGNED\nOrigin: x\n");
        assert_eq!(signer.detached_sign(b"a\n")?, b"SIGNED\na\n");

        Ok(())
    }
}
