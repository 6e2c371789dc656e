//! Parse results and the entry points that produce them.

use crate::config::{Configuration, expand_home};
use crate::core::{InnerLink, Node};
use crate::error::OrgError;
use crate::format::Writer;
use crate::lexer::{self, Token};
use crate::outline::Outline;
use crate::parser::at_end;
use crate::store::{IdStore, JsonIdStore};
use indexmap::IndexMap;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Nesting limit for `#+SETUPFILE:` chains.
pub(crate) const MAX_SETUP_DEPTH: usize = 16;

/// Everything produced by one parse call.
///
/// A document is parsed at most once. Failures are reported through [`Document::error`];
/// `nodes` is only set when parsing succeeded.
#[derive(Debug, Serialize)]
pub struct Document<'c> {
    #[serde(skip)]
    pub(crate) config: &'c Configuration,
    /// Path of the parsed input, used to resolve relative paths.
    pub path: PathBuf,
    #[serde(skip)]
    pub(crate) tokens: Vec<Token>,
    #[serde(skip)]
    tokenized: bool,
    /// Indent that continuation lines are measured from (set while inside list items).
    #[serde(skip)]
    pub(crate) base_level: usize,
    /// Documents whose SETUPFILE chain led to this one, outermost first.
    #[serde(skip)]
    pub(crate) setup_chain: Vec<PathBuf>,
    pub macros: IndexMap<String, String>,
    pub links: IndexMap<String, String>,
    pub inner_links: IndexMap<String, InnerLink>,
    /// `id:` link targets → file path (empty until resolved).
    pub id_links: IndexMap<String, String>,
    pub nodes: Option<Vec<Node>>,
    pub outline: Outline,
    /// Settings parsed from `#+KEY:` lines; they take precedence over the defaults.
    pub buffer_settings: IndexMap<String, String>,
    #[serde(skip)]
    pub error: Option<OrgError>,
    #[serde(skip)]
    pub(crate) counters: Counters,
}

/// Per-kind inner link counters.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub table: usize,
    pub figure: usize,
    pub code: usize,
}

impl<'c> Document<'c> {
    pub fn new(config: &'c Configuration, path: impl AsRef<Path>) -> Self {
        Self {
            config,
            path: path.as_ref().to_path_buf(),
            tokens: vec![],
            tokenized: false,
            base_level: 0,
            setup_chain: vec![],
            macros: IndexMap::new(),
            links: IndexMap::new(),
            inner_links: IndexMap::new(),
            id_links: IndexMap::new(),
            nodes: None,
            outline: Outline::new(),
            buffer_settings: IndexMap::new(),
            error: None,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &'c Configuration {
        self.config
    }

    /// Tokenize and parse `input`, then resolve collected `id:` links.
    ///
    /// Calling this a second time records [`OrgError::AlreadyParsed`] and leaves the
    /// first result untouched.
    pub fn parse(&mut self, input: &str) -> &mut Self {
        if self.tokenized {
            self.error = Some(OrgError::AlreadyParsed);
            return self;
        }
        self.tokenized = true;
        match self.parse_input(input) {
            Ok(nodes) => {
                self.nodes = Some(nodes);
                self.fetch_id_links();
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "parse failed");
                self.nodes = None;
                self.error = Some(err);
            }
        }
        self
    }

    fn parse_input(&mut self, input: &str) -> Result<Vec<Node>, OrgError> {
        self.tokens = input
            .lines()
            .map(lexer::tokenize)
            .collect::<Result<_, _>>()?;
        let (_, nodes) = self.parse_many(0, &at_end)?;
        Ok(nodes)
    }

    /// Buffer setting for `key`, falling back to the configured default, else `""`.
    pub fn get(&self, key: &str) -> &str {
        self.buffer_settings
            .get(key)
            .or_else(|| self.config.default_settings.get(key))
            .map_or("", String::as_str)
    }

    /// Value of the export option `key` from the `OPTIONS` setting (e.g. `toc`, `todo`).
    ///
    /// Falls back to the default `OPTIONS` and finally to `"nil"`.
    pub fn get_option(&self, key: &str) -> String {
        let prefix = format!("{key}:");
        let find = |settings: &IndexMap<String, String>| {
            settings
                .get("OPTIONS")
                .into_iter()
                .flat_map(|options| options.split_whitespace())
                .find_map(|field| field.strip_prefix(&prefix))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        find(&self.buffer_settings)
            .or_else(|| find(&self.config.default_settings))
            .unwrap_or_else(|| {
                tracing::warn!(option = key, "missing value for export option");
                "nil".to_string()
            })
    }

    /// Render the parsed nodes with `writer`.
    pub fn write<W: Writer>(&self, mut writer: W) -> Result<String, OrgError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let nodes = self.nodes.as_ref().ok_or(OrgError::NotParsed)?;
        writer.before(self)?;
        for node in nodes {
            writer.write_node(node)?;
        }
        writer.after(self)?;
        Ok(writer.finish())
    }

    /// Resolve every collected `id:` target through the configured store.
    ///
    /// Unknown ids and store failures are logged; affected ids stay empty.
    pub fn fetch_id_links(&mut self) {
        if self.id_links.is_empty() {
            return;
        }
        let store: Arc<dyn IdStore> = match &self.config.id_store {
            Some(store) => Arc::clone(store),
            None => {
                let opened = expand_home(&self.config.id_db)
                    .and_then(|db| JsonIdStore::open(&db, self.config.read_file.as_ref()));
                match opened {
                    Ok(store) => Arc::new(store),
                    Err(err) => {
                        tracing::warn!(%err, "failed to open id store, id links stay unresolved");
                        return;
                    }
                }
            }
        };
        for (id, file) in self.id_links.iter_mut() {
            match store.lookup(id) {
                Ok(Some(found)) => *file = found,
                Ok(None) => tracing::warn!(id = %id, "could not find file for id"),
                Err(err) => tracing::warn!(id = %id, %err, "could not look up id"),
            }
        }
    }

    /// Directory relative paths in keywords are resolved against.
    pub(crate) fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}
