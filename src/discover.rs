use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A candidate file found under the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub size: u64,
    pub relative: PathBuf,
}

impl InputFile {
    /// Relative path as it appears in reports.
    pub fn display_name(&self) -> String {
        self.relative.display().to_string()
    }
}

/// Case-insensitive match of `path`'s extension against `extension`.
/// Compares raw `OsStr` bytes, so names that are not valid UTF-8 still match.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let ext = extension.trim_start_matches('.');
    path.extension()
        .is_some_and(|found| found.eq_ignore_ascii_case(ext))
}

/// Collects every regular file under `root` whose extension matches.
///
/// Entries are sorted by file name within each directory so the order (and
/// therefore the report) is the same on every platform. Unreadable
/// directories are logged and skipped; the walk never fails as a whole.
pub fn discover(root: &Path, extension: &str, recursive: bool) -> Vec<InputFile> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let dir = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(directory = %dir, error = %err, "cannot read directory; skipping");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if !has_extension(entry.path(), extension) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "cannot stat file; skipping");
                continue;
            }
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        files.push(InputFile {
            path: entry.path().to_path_buf(),
            size,
            relative,
        });
    }

    debug!(root = %root.display(), count = files.len(), "discovery finished");
    files
}
