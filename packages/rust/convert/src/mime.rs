//! MIME classification and folder listing.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use ragpipe_shared::{RagPipeError, Result};

/// Guess a file's MIME type from its extension.
///
/// Markdown is pinned to `text/markdown` regardless of the platform table.
pub fn guess_mime(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if matches!(ext.as_str(), "md" | "markdown") {
        return Some("text/markdown".to_string());
    }
    mime_guess::from_ext(&ext).first_raw().map(str::to_string)
}

/// Sources grouped by MIME type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimeRoutes {
    /// One entry per configured MIME type, in configuration order.
    pub routes: Vec<(String, Vec<PathBuf>)>,
    /// Sources whose type is unknown or not configured.
    pub unclassified: Vec<PathBuf>,
}

impl MimeRoutes {
    pub fn get(&self, mime_type: &str) -> Option<&[PathBuf]> {
        self.routes
            .iter()
            .find(|(m, _)| m == mime_type)
            .map(|(_, paths)| paths.as_slice())
    }
}

/// Split sources by MIME type. Every configured type gets an entry, even
/// when no source matches it.
pub fn route_by_mime(sources: &[PathBuf], mime_types: &[String]) -> MimeRoutes {
    let mut routes: Vec<(String, Vec<PathBuf>)> =
        mime_types.iter().map(|m| (m.clone(), Vec::new())).collect();
    let mut unclassified = Vec::new();

    for source in sources {
        let mime = guess_mime(source);
        let slot = routes
            .iter_mut()
            .find(|(m, _)| Some(m.as_str()) == mime.as_deref());
        match slot {
            Some((_, paths)) => paths.push(source.clone()),
            None => unclassified.push(source.clone()),
        }
    }

    MimeRoutes {
        routes,
        unclassified,
    }
}

/// All regular files under `dir`, recursively, in sorted order.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagPipeError::validation(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let files = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    Ok(files)
}
