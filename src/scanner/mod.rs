//! Source tree scanner.
//!
//! Walks a source root, picks out supported audio files and yields them in
//! byte-wise lexicographic order of their full path. Any directory named
//! like the output folder is pruned, so converted files are never fed back
//! into a run when the output lives inside the source tree.

use audiobook_av::AudioProbe;
use audiobook_common::paths::is_audio_file;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Errors that stop a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One discovered source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFileRecord {
    /// Absolute path of the source file.
    pub source_path: PathBuf,
    /// Path relative to the scan root.
    pub relative_path: PathBuf,
    /// Filled in once the file has been probed.
    pub probe: Option<AudioProbe>,
}

impl AudioFileRecord {
    /// Directory of the file relative to the scan root (empty at the root).
    pub fn relative_dir(&self) -> &Path {
        self.relative_path.parent().unwrap_or(Path::new(""))
    }
}

/// Scanner for discovering audio files under a source root.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    output_folder: String,
}

impl DirectoryScanner {
    /// Create a scanner that skips directories named `output_folder`
    /// (compared case-insensitively).
    pub fn new(output_folder: impl Into<String>) -> Self {
        Self {
            output_folder: output_folder.into(),
        }
    }

    fn is_output_folder(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.eq_ignore_ascii_case(&self.output_folder))
    }

    /// Scan `root` for supported audio files.
    ///
    /// The whole tree is read before returning, since ordering needs every
    /// path. Each call walks the filesystem again.
    pub fn scan(&self, root: &Path) -> Result<std::vec::IntoIter<AudioFileRecord>, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::DirectoryNotFound(root.to_path_buf()));
        }
        let root = std::path::absolute(root)?;

        info!("Scanning directory: {:?}", root);
        let mut records = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                let skip = self.is_output_folder(e);
                if skip {
                    debug!("Skipping output folder: {:?}", e.path());
                }
                !skip
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!("Skipping symlink loop: {}", e);
                    continue;
                }
                Err(e) => {
                    let path = e.path().unwrap_or(&root).to_path_buf();
                    return Err(ScanError::Walk { path, source: e });
                }
            };

            if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
                continue;
            }

            let source_path = entry.into_path();
            let relative_path = match source_path.strip_prefix(&root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };

            records.push(AudioFileRecord {
                source_path,
                relative_path,
                probe: None,
            });
        }

        records.sort_by(|a, b| a.source_path.as_os_str().cmp(b.source_path.as_os_str()));

        info!("Found {} audio files", records.len());
        Ok(records.into_iter())
    }
}
