//! Parser configuration and the injected collaborators (file reader, id store).

use crate::document::Document;
use crate::error::OrgError;
use crate::store::IdStore;
use indexmap::IndexMap;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Default location of the id → file index.
pub const DEFAULT_ID_DB: &str = "~/doc/org-roam.json";

/// Reads files referenced by `#+SETUPFILE:` and `#+INCLUDE:` (and the id index).
///
/// Any `Fn(&Path) -> io::Result<Vec<u8>>` works, which makes virtual file systems
/// in tests a one-liner.
pub trait FileReader: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads from local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

impl<F> FileReader for F
where
    F: Fn(&Path) -> io::Result<Vec<u8>> + Send + Sync,
{
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self(path)
    }
}

pub struct Configuration {
    /// Maximum number of newlines inside an emphasis span.
    pub max_emphasis_new_lines: usize,
    /// Turn bare `http(s)://` and `mailto:` text into links.
    pub auto_link: bool,
    /// Fallback values for settings not overridden by the document's keywords.
    pub default_settings: IndexMap<String, String>,
    pub read_file: Arc<dyn FileReader>,
    /// JSON index used by [`crate::store::JsonIdStore`] when no `id_store` is set.
    pub id_db: PathBuf,
    pub id_store: Option<Arc<dyn IdStore>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("max_emphasis_new_lines", &self.max_emphasis_new_lines)
            .field("auto_link", &self.auto_link)
            .field("default_settings", &self.default_settings)
            .field("id_db", &self.id_db)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    pub fn new() -> Self {
        let default_settings = [
            ("TODO", "TODO | DONE"),
            ("EXCLUDE_TAGS", "noexport"),
            (
                "OPTIONS",
                "toc:t <:t e:t f:t pri:t todo:t tags:t title:nil sec:nil",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            max_emphasis_new_lines: 1,
            auto_link: true,
            default_settings,
            read_file: Arc::new(FsReader),
            id_db: PathBuf::from(DEFAULT_ID_DB),
            id_store: None,
        }
    }

    pub fn with_reader(mut self, reader: impl FileReader + 'static) -> Self {
        self.read_file = Arc::new(reader);
        self
    }

    pub fn with_id_store(mut self, store: impl IdStore + 'static) -> Self {
        self.id_store = Some(Arc::new(store));
        self
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.default_settings
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Parse `input`; `path` is used to resolve relative SETUPFILE/INCLUDE paths.
    ///
    /// Errors are stored in [`Document::error`] rather than returned.
    pub fn parse(&self, input: &str, path: impl AsRef<Path>) -> Document<'_> {
        let mut doc = Document::new(self, path.as_ref());
        doc.parse(input);
        doc
    }

    /// Read `path` through the configured reader and parse it.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Document<'_>, OrgError> {
        let path = path.as_ref();
        let bytes = self
            .read_file
            .read(path)
            .map_err(|err| OrgError::io(path, &err))?;
        Ok(self.parse(&String::from_utf8_lossy(&bytes), path))
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, OrgError> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = std::env::var_os("HOME").ok_or_else(|| OrgError::Io {
        path: path.to_path_buf(),
        message: "home directory is not set".into(),
    })?;
    Ok(PathBuf::from(home).join(rest))
}
