//! Knowledge-base folder discovery.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::RagConfig;
use crate::document::Document;
use crate::error::{RagError, Result};

/// Documents read from a folder, plus the entries that were passed over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedFolder {
    /// Documents in lexicographic file-name order.
    pub documents: Vec<Document>,
    /// Names of regular files whose extension is not recognized.
    pub skipped: Vec<String>,
}

/// Read every recognized text file directly inside `folder`.
///
/// Files are visited in lexicographic file-name order so repeated runs over
/// the same folder produce the same document sequence. Subdirectories are
/// not descended into. Symlinks to files are followed.
///
/// # Errors
///
/// Returns [`RagError::Io`] if the folder cannot be listed or a recognized
/// file cannot be read as UTF-8 text.
pub fn load_documents(folder: impl AsRef<Path>, config: &RagConfig) -> Result<LoadedFolder> {
    let folder = folder.as_ref();
    let metadata = fs::metadata(folder).map_err(|e| RagError::io(folder, e))?;
    if !metadata.is_dir() {
        return Err(RagError::io(
            folder,
            io::Error::new(io::ErrorKind::NotADirectory, "document folder is not a directory"),
        ));
    }

    let mut loaded = LoadedFolder::default();
    let entries =
        WalkDir::new(folder).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name();

    for entry in entries {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(folder).to_path_buf();
            let source = e.into_io_error().unwrap_or_else(|| io::Error::other("directory walk failed"));
            RagError::io(path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !config.accepts_file_name(&name) {
            debug!(file = %name, "skipping file with unrecognized extension");
            loaded.skipped.push(name);
            continue;
        }

        let text = fs::read_to_string(entry.path()).map_err(|e| {
            warn!(file = %name, error = %e, "failed to read document");
            RagError::io(entry.path(), e)
        })?;
        debug!(file = %name, chars = text.chars().count(), "read document");
        loaded.documents.push(Document { name, text });
    }

    Ok(loaded)
}
