// ABOUTME: Closed set of durable artifact classes and their filename classifiers
// ABOUTME: Maps each class to its durable store root and the render subtree it reconciles

use once_cell::sync::Lazy;
use plinth_core::constants::{SECRET_FILE_NAME, UPLOADS_DIR};
use plinth_core::{walk_files, Layout, WalkedFile};
use regex::Regex;
use std::path::{Path, PathBuf};

static DATABASE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\.(db|sqlite[0-9]*|duckdb|mdb|accdb)(-wal|-shm|-journal|\.wal)?$").ok()
});

/// Extensions accepted as user uploads
const UPLOAD_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico", "tif", "tiff", "avif", "heic",
    // audio
    "mp3", "wav", "ogg", "flac", "m4a", "aac", "opus",
    // video
    "mp4", "webm", "mov", "mkv", "avi", "m4v",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "txt", "md", "rtf",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar",
    // structured data
    "json", "csv", "tsv", "xml", "yaml", "yml", "ndjson", "parquet",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactClass {
    Database,
    Secret,
    Upload,
}

impl ArtifactClass {
    pub const ALL: [ArtifactClass; 3] = [
        ArtifactClass::Database,
        ArtifactClass::Secret,
        ArtifactClass::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactClass::Database => "database",
            ArtifactClass::Secret => "secret",
            ArtifactClass::Upload => "upload",
        }
    }

    /// Canonical store for this class and site
    pub fn durable_root(&self, layout: &Layout, site: &str) -> PathBuf {
        match self {
            ArtifactClass::Database => layout.live_data_dir(site),
            ArtifactClass::Secret => layout.secrets_dir(site),
            ArtifactClass::Upload => layout.uploads_dir(site),
        }
    }

    /// Part of a render that mirrors the durable root
    pub fn render_subtree(&self, render_dir: &Path) -> PathBuf {
        match self {
            ArtifactClass::Database | ArtifactClass::Secret => render_dir.to_path_buf(),
            ArtifactClass::Upload => render_dir.join(UPLOADS_DIR),
        }
    }

    /// Whether a path relative to the class subtree belongs to this class
    pub fn matches(&self, relative: &Path) -> bool {
        match self {
            ArtifactClass::Database => relative
                .file_name()
                .and_then(|n| n.to_str())
                .zip(DATABASE_PATTERN.as_ref())
                .is_some_and(|(name, pattern)| pattern.is_match(name)),
            ArtifactClass::Secret => relative == Path::new(SECRET_FILE_NAME),
            ArtifactClass::Upload => relative
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .is_some_and(|e| UPLOAD_EXTENSIONS.contains(&e.as_str())),
        }
    }

    /// Class members under `root`, relative to it.
    ///
    /// The secret class only ever has one candidate, so it is checked directly
    /// instead of walking the whole tree.
    pub(crate) fn collect(&self, root: &Path) -> Vec<WalkedFile> {
        if *self == ArtifactClass::Secret {
            let path = root.join(SECRET_FILE_NAME);
            return match std::fs::symlink_metadata(&path) {
                Ok(meta) if !meta.is_dir() => vec![WalkedFile {
                    path,
                    relative: PathBuf::from(SECRET_FILE_NAME),
                    is_symlink: meta.file_type().is_symlink(),
                }],
                _ => Vec::new(),
            };
        }

        walk_files(root)
            .into_iter()
            .filter(|f| self.matches(&f.relative))
            .collect()
    }
}

impl std::fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
