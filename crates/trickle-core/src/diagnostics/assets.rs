//! Recursive static asset listing

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Regular files under `root`, as paths relative to `root`
///
/// The walk is lazy and sorted by file name within each directory. Symlinks
/// are followed; a link that loops back into its own ancestry is reported by
/// the walker and skipped like any other unreadable entry. A missing or
/// unreadable root yields nothing.
pub fn list_files(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
}

/// Relative paths of `.html` files under `root`
pub fn list_html(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    list_files(root).filter(|path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
    })
}
