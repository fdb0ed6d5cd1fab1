//! Output files that only appear under their final name once complete.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A file written next to its target and renamed into place on success.
///
/// Dropping it without [`PendingFile::persist`] removes the temporary file,
/// so a failed run never leaves a half-written output under the real name.
#[derive(Debug)]
pub struct PendingFile {
    temp: PathBuf,
    target: PathBuf,
    persisted: bool,
}

impl PendingFile {
    /// Create the temporary file and write `parts` to it in order.
    pub fn create(target: impl AsRef<Path>, parts: &[&[u8]]) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.pdf".to_string());
        let temp = target.with_file_name(format!(".{}.{}.part", file_name, std::process::id()));

        let pending = Self {
            temp,
            target,
            persisted: false,
        };
        let mut file = File::create(&pending.temp)?;
        for part in parts {
            file.write_all(part)?;
        }
        file.sync_all()?;
        Ok(pending)
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Final path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Overwrite bytes at `offset` in the temporary file.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.temp)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Rename the temporary file onto the target.
    pub fn persist(mut self) -> Result<PathBuf> {
        fs::rename(&self.temp, &self.target)?;
        self.persisted = true;
        Ok(self.target.clone())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.persisted {
            if let Err(e) = fs::remove_file(&self.temp) {
                log::debug!("could not remove {}: {}", self.temp.display(), e);
            }
        }
    }
}
