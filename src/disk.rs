//! Atomic persistence of credential artifacts to the target directory.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::artifact::CredentialArtifact;

/// File name of the PEM-encoded leaf certificate chain.
pub const SVID_FILE: &str = "svid.pem";
/// File name of the PEM-encoded private key.
pub const SVID_KEY_FILE: &str = "svid-key.pem";
/// File name of the PEM-encoded trust bundle.
pub const BUNDLE_FILE: &str = "bundle.pem";

/// One of the three files making up an on-disk credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFile {
    /// The leaf certificate chain, `svid.pem`.
    Svid,
    /// The private key, `svid-key.pem`.
    SvidKey,
    /// The trust bundle, `bundle.pem`.
    Bundle,
}

impl CredentialFile {
    fn file_name(self) -> &'static str {
        match self {
            Self::Svid => SVID_FILE,
            Self::SvidKey => SVID_KEY_FILE,
            Self::Bundle => BUNDLE_FILE,
        }
    }

    /// The private key is readable by the owner only; certificates and
    /// bundles are public material and stay group/world readable.
    #[cfg(unix)]
    fn mode(self) -> u32 {
        match self {
            Self::Svid | Self::Bundle => 0o644,
            Self::SvidKey => 0o400,
        }
    }
}

impl fmt::Display for CredentialFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// An error that may arise persisting a credential set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiskError {
    /// The target directory already holds a credential set (`svid*.pem`).
    #[error("SVIDs already exist in {}", dir.display())]
    AlreadyExists {
        /// The target directory.
        dir: PathBuf,
    },

    /// The target directory could not be listed.
    #[error("failed to list {}: {source}", dir.display())]
    List {
        /// The target directory.
        dir: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing one of the credential files failed. Files written before the
    /// failure are left in place; the next rotation overwrites all three.
    #[error("failed to write {file} to {}: {source}", path.display())]
    Write {
        /// Which credential file failed.
        file: CredentialFile,
        /// Full path of the failed file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Writer for the single credential set held in one target directory.
///
/// Each file is written to a temporary sibling and renamed into place, so a
/// reader polling the directory sees either the old content or the new
/// content of a file, never a truncated one.
#[derive(Debug, Clone)]
pub struct SvidDisk {
    dir: PathBuf,
}

impl SvidDisk {
    /// Creates a writer for the given target directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pre-flight guard: fails with [`DiskError::AlreadyExists`] if the
    /// directory already holds a file matching `svid*.pem`.
    ///
    /// Read-only; used before the first write in init mode so an
    /// operator-provisioned credential set is never silently overwritten.
    pub fn check_no_existing_svid(&self) -> Result<(), DiskError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| DiskError::List {
            dir: self.dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| DiskError::List {
                dir: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("svid") && name.ends_with(".pem") {
                return Err(DiskError::AlreadyExists {
                    dir: self.dir.clone(),
                });
            }
        }

        Ok(())
    }

    /// Writes the artifact as `svid.pem`, `svid-key.pem` and `bundle.pem`.
    ///
    /// Writing the same artifact twice yields byte-identical files. On
    /// failure the error names the file that failed; already-renamed
    /// siblings are not rolled back, callers treat the set as "state
    /// unknown" and rely on the next rotation to overwrite all three.
    pub fn write(&self, artifact: &CredentialArtifact) -> Result<(), DiskError> {
        self.write_file(CredentialFile::Svid, artifact.svid_pem())?;
        self.write_file(CredentialFile::SvidKey, artifact.key_pem())?;
        self.write_file(CredentialFile::Bundle, artifact.bundle_pem())?;
        Ok(())
    }

    fn write_file(&self, file: CredentialFile, contents: &[u8]) -> Result<(), DiskError> {
        let path = self.dir.join(file.file_name());
        // The temporary name must not match the svid*.pem guard pattern.
        let tmp = self.dir.join(format!("{}.tmp", file.file_name()));

        self.try_write_file(&tmp, &path, file, contents)
            .map_err(|source| {
                // Leftover temp files are harmless but confusing; best effort.
                let _ = fs::remove_file(&tmp);
                DiskError::Write { file, path, source }
            })
    }

    fn try_write_file(
        &self,
        tmp: &Path,
        path: &Path,
        file: CredentialFile,
        contents: &[u8],
    ) -> io::Result<()> {
        use std::io::Write;

        // A crash after the chmod below can leave a read-only tmp behind,
        // which would fail the truncating open on the next rotation.
        match fs::remove_file(tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let mut out = open_tmp(tmp)?;
        out.write_all(contents)?;
        drop(out);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp, fs::Permissions::from_mode(file.mode()))?;
        }
        #[cfg(not(unix))]
        let _ = file;

        // Visible at its final path only once fully written.
        fs::rename(tmp, path)
    }
}

/// Every tmp starts owner-only; the private key must not be readable by
/// group or world even while it is being written. Public files are widened
/// to their final mode just before the rename.
fn open_tmp(tmp: &Path) -> io::Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(tmp)
}
