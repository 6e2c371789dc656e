//! `#+KEY: value` lines: settings, registries, SETUPFILE/INCLUDE and affiliated metadata.

use super::{PResult, Stop};
use crate::config::{Configuration, expand_home};
use crate::core::{
    Block, BlockContent, Comment, Include, IncludeTarget, InnerLink, Inline, Keyword, LinkType,
    Metadata, Node, NodeWithMeta,
};
use crate::document::{Document, MAX_SETUP_DEPTH};
use crate::error::OrgError;
use crate::lexer::{Token, TokenKind};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

static INCLUDE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^"([^"]+)" (src|example|export) (\w+)$"#).unwrap());
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s+)(:[-\w]+)\s+(.*)$").unwrap());

fn keyword_of(t: &Token) -> Keyword {
    Keyword {
        key: t.capture(2).to_uppercase(),
        value: t.capture(4).trim().to_string(),
    }
}

impl Document<'_> {
    pub(crate) fn parse_comment(&mut self, i: usize) -> PResult {
        let content = self.token(i)?.content.clone();
        Ok((1, Some(Node::Comment(Comment { content }))))
    }

    pub(crate) fn parse_keyword(&mut self, i: usize, stop: &Stop<'_>) -> PResult {
        let k = keyword_of(self.token(i)?);
        match k.key.as_str() {
            "SETUPFILE" => {
                self.load_setup_file(&k);
                Ok((1, Some(Node::Keyword(k))))
            }
            "INCLUDE" => Ok((1, Some(Node::Include(self.parse_include(k))))),
            "LINK" => {
                if let Some((name, target)) = alias(&k.value) {
                    self.links.insert(name, target);
                }
                Ok((1, Some(Node::Keyword(k))))
            }
            "MACRO" => {
                if let Some((name, body)) = alias(&k.value) {
                    self.macros.insert(name, body);
                }
                Ok((1, Some(Node::Keyword(k))))
            }
            key => {
                if matches!(key, "NAME" | "CAPTION" | "ATTR_HTML") {
                    let (consumed, node) = self.parse_affiliated(i, stop)?;
                    if consumed != 0 {
                        return Ok((consumed, node));
                    }
                    tracing::debug!(line = i + 1, key, "affiliated keyword without a target");
                }
                self.buffer_settings
                    .entry(k.key.clone())
                    .and_modify(|v| {
                        v.push('\n');
                        v.push_str(&k.value);
                    })
                    .or_insert_with(|| k.value.clone());
                Ok((1, Some(Node::Keyword(k))))
            }
        }
    }

    /// Collect a run of NAME/CAPTION/ATTR_HTML lines and attach them to the next node.
    ///
    /// Declines (dropping the metadata) when the run contains another keyword or no node
    /// follows before `stop`.
    fn parse_affiliated(&mut self, i: usize, stop: &Stop<'_>) -> PResult {
        let start = i;
        let mut i = i;
        let mut meta = Metadata::default();
        while !stop(&self.tokens, i) {
            let t = self.token(i)?;
            if t.kind != TokenKind::Keyword {
                break;
            }
            let k = keyword_of(t);
            match k.key.as_str() {
                "NAME" => meta.name = Some(k.value),
                "CAPTION" => {
                    let caption = self.parse_inline(&k.value);
                    meta.captions.push(caption);
                }
                "ATTR_HTML" => meta.html_attributes.push(html_attributes(&k.value)),
                _ => return Ok((0, None)),
            }
            i += 1;
        }
        if stop(&self.tokens, i) {
            return Ok((0, None));
        }
        let (consumed, node) = self.parse_one(i, stop)?;
        let Some(node) = node.filter(|_| consumed > 0) else {
            return Ok((0, None));
        };
        i += consumed;

        if let Some(kind) = link_type(&node) {
            self.register_inner_link(kind, &mut meta);
        }
        Ok((
            i - start,
            Some(Node::NodeWithMeta(NodeWithMeta {
                node: Box::new(node),
                meta,
            })),
        ))
    }

    /// Number the node within its kind and name it `t<N>`/`f<N>`/`c<N>` when unnamed.
    fn register_inner_link(&mut self, kind: LinkType, meta: &mut Metadata) {
        let (counter, prefix) = match kind {
            LinkType::Table => (&mut self.counters.table, 't'),
            LinkType::Figure => (&mut self.counters.figure, 'f'),
            LinkType::Code => (&mut self.counters.code, 'c'),
        };
        *counter += 1;
        let index = *counter;
        let name = meta
            .name
            .get_or_insert_with(|| format!("{prefix}{index}"))
            .clone();
        self.inner_links
            .insert(name.clone(), InnerLink { index, name, kind });
    }

    /// Merge the buffer settings of the referenced file into this document.
    ///
    /// Failures are logged and leave the keyword unresolved.
    fn load_setup_file(&mut self, k: &Keyword) {
        if self.setup_chain.len() >= MAX_SETUP_DEPTH {
            tracing::warn!(path = %self.path.display(), value = %k.value, "setup files nested too deeply");
            return;
        }
        let path = match expand_home(Path::new(&k.value)) {
            Ok(p) if p.is_absolute() => p,
            Ok(p) => self.dir().join(p),
            Err(err) => {
                tracing::warn!(value = %k.value, %err, "bad setup file");
                return;
            }
        };
        if path == self.path || self.setup_chain.contains(&path) {
            tracing::warn!(path = %path.display(), "setup file includes itself, skipping");
            return;
        }
        let text = match self.config.read_file.read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "bad setup file");
                return;
            }
        };
        let mut setup = Document::new(self.config, &path);
        setup.setup_chain = self.setup_chain.clone();
        setup.setup_chain.push(self.path.clone());
        setup.parse(&text);
        if let Some(err) = &setup.error {
            tracing::warn!(path = %path.display(), %err, "bad setup file");
            return;
        }
        tracing::debug!(path = %path.display(), settings = setup.buffer_settings.len(), "loaded setup file");
        self.buffer_settings.extend(setup.buffer_settings);
    }

    fn parse_include(&self, keyword: Keyword) -> Include {
        let target = match INCLUDE_FILE.captures(&keyword.value) {
            Some(caps) => {
                let path = Path::new(&caps[1]);
                IncludeTarget::File {
                    path: if path.is_absolute() {
                        path.to_path_buf()
                    } else {
                        self.dir().join(path)
                    },
                    kind: caps[2].to_lowercase(),
                    language: caps[3].to_string(),
                }
            }
            None => IncludeTarget::Literal,
        };
        Include { keyword, target }
    }
}

impl Include {
    /// Read the included file now. Unusable targets yield the keyword itself.
    pub fn resolve(&self, config: &Configuration) -> Node {
        match self.try_resolve(config) {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!(value = %self.keyword.value, %err, "bad include");
                Node::Keyword(self.keyword.clone())
            }
        }
    }

    fn try_resolve(&self, config: &Configuration) -> Result<Node, OrgError> {
        let IncludeTarget::File {
            path,
            kind,
            language,
        } = &self.target
        else {
            return Err(OrgError::Parse(
                "expected \"<path>\" src|example|export <language>".into(),
            ));
        };
        let bytes = config
            .read_file
            .read(path)
            .map_err(|err| OrgError::io(path, &err))?;
        Ok(Node::Block(Block {
            name: kind.to_uppercase(),
            parameters: vec![language.clone()],
            content: BlockContent::Raw(String::from_utf8_lossy(&bytes).into_owned()),
            result: None,
        }))
    }
}

/// First two space separated words of a LINK/MACRO value.
fn alias(value: &str) -> Option<(String, String)> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next()) {
        (Some(name), Some(target)) => Some((name.to_string(), target.to_string())),
        _ => None,
    }
}

/// Split an ATTR_HTML value into `[key, value, key, value, ..]`.
///
/// A value runs until the next ` :key value` pair.
fn html_attributes(value: &str) -> Vec<String> {
    let mut attributes = Vec::new();
    let mut rest = value;
    while let Some(caps) = ATTRIBUTE.captures(rest) {
        let (Some(key), Some(tail)) = (caps.get(1), caps.get(2)) else {
            break;
        };
        attributes.push(key.as_str().to_string());
        rest = tail.as_str();
        match ATTRIBUTE.find(rest) {
            Some(next) => {
                attributes.push(rest[..next.start()].to_string());
                rest = &rest[next.start()..];
            }
            None => {
                attributes.push(rest.trim().to_string());
                break;
            }
        }
    }
    attributes
}

/// Cross-reference kind for nodes that take part in inner link numbering.
fn link_type(node: &Node) -> Option<LinkType> {
    match node {
        Node::Table(_) => Some(LinkType::Table),
        Node::Block(b) if b.name == "SRC" => Some(LinkType::Code),
        Node::Paragraph(p) => {
            let mut visible = p.children.iter().filter(|x| match x {
                Inline::Text(t) => !t.trim().is_empty(),
                _ => true,
            });
            match (visible.next(), visible.next()) {
                (Some(Inline::Link(link)), None) if link.is_image_or_video() => {
                    Some(LinkType::Figure)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Reader serving `body` for every path, counting calls.
    fn counting_reader(
        body: &'static str,
    ) -> (
        Arc<AtomicUsize>,
        impl Fn(&Path) -> io::Result<Vec<u8>> + Send + Sync,
    ) {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let reader = move |_: &Path| -> io::Result<Vec<u8>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(body.as_bytes().to_vec())
        };
        (reads, reader)
    }

    fn files(entries: &[(&str, &str)]) -> impl Fn(&Path) -> io::Result<Vec<u8>> + Send + Sync {
        let map: HashMap<_, _> = entries
            .iter()
            .map(|(p, c)| (Path::new(p).to_path_buf(), c.as_bytes().to_vec()))
            .collect();
        move |p: &Path| {
            map.get(p)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, p.display().to_string()))
        }
    }

    #[test]
    fn named_and_unnamed_tables_are_numbered() {
        let config = Configuration::new();
        let input = "#+NAME: mytable\n| a | b |\n\ntext\n\n#+CAPTION: Second\n| c |";
        let doc = config.parse(input, "./");
        assert_eq!(
            doc.inner_links["mytable"],
            InnerLink {
                index: 1,
                name: "mytable".into(),
                kind: LinkType::Table
            }
        );
        assert_eq!(doc.inner_links["t2"].index, 2);
        let nodes = doc.nodes.as_deref().expect("nodes");
        let Node::NodeWithMeta(last) = &nodes[nodes.len() - 1] else {
            panic!("expected metadata wrapper");
        };
        assert_eq!(last.meta.name.as_deref(), Some("t2"));
        assert_eq!(last.meta.captions, [vec![Inline::Text("Second".into())]]);
    }

    #[test]
    fn code_and_figure_counters_are_independent() {
        let config = Configuration::new();
        let input = "#+NAME: first\n#+BEGIN_SRC sh\nls\n#+END_SRC\n\n#+CAPTION: A plot\n[[file:plot.png]]\n\n#+ATTR_HTML: :class x\n#+BEGIN_SRC rust\nfn main() {}\n#+END_SRC";
        let doc = config.parse(input, "./");
        assert_eq!(doc.inner_links["first"].kind, LinkType::Code);
        assert_eq!(doc.inner_links["f1"].kind, LinkType::Figure);
        assert_eq!(doc.inner_links["c2"].index, 2);
        assert_eq!(doc.inner_links.len(), 3);
    }

    #[test]
    fn orphan_metadata_is_dropped() {
        let config = Configuration::new();
        let doc = config.parse("#+NAME: lonely", "./");
        assert!(doc.inner_links.is_empty());
        assert_eq!(doc.get("NAME"), "lonely");
        let nodes = doc.nodes.as_deref().expect("nodes");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind_name(), "keyword");
    }

    #[test]
    fn attribute_values_split_at_next_key() {
        assert_eq!(
            html_attributes(":width 300px :alt a picture :class wide"),
            [":width", "300px", ":alt", "a picture", ":class", "wide"]
        );
        assert!(html_attributes("no keys here").is_empty());
    }

    #[test]
    fn link_and_macro_registries() {
        let config = Configuration::new();
        let doc = config.parse(
            "#+LINK: gh https://github.com/%s\n#+MACRO: version 1.2\n#+LINK: broken",
            "./",
        );
        assert_eq!(doc.links["gh"], "https://github.com/%s");
        assert_eq!(doc.macros["version"], "1.2");
        assert_eq!(doc.links.len(), 1);
    }

    #[test]
    fn setup_file_settings_are_merged() {
        let config = Configuration::new().with_reader(files(&[(
            "/notes/setup.org",
            "#+TODO: A | B\n#+AUTHOR: someone",
        )]));
        let doc = config.parse("#+SETUPFILE: setup.org\n* A task", "/notes/index.org");
        assert_eq!(doc.get("TODO"), "A | B");
        assert_eq!(doc.get("AUTHOR"), "someone");
        let nodes = doc.nodes.as_deref().expect("nodes");
        let Node::Headline(h) = &nodes[1] else {
            panic!("expected headline");
        };
        assert_eq!(h.status.as_deref(), Some("A"));
    }

    #[test]
    fn unreadable_setup_file_is_not_fatal() {
        let config = Configuration::new().with_reader(files(&[]));
        let doc = config.parse("#+SETUPFILE: missing.org", "/notes/index.org");
        assert!(doc.error.is_none());
        assert_eq!(doc.get("TODO"), "TODO | DONE");
    }

    #[test]
    fn self_including_setup_file_is_read_once() {
        let (reads, reader) =
            counting_reader("#+SETUPFILE: loop.org\n#+SETUPFILE: loop.org\n#+TITLE: loop");
        let config = Configuration::new().with_reader(reader);
        let doc = config.parse("#+SETUPFILE: loop.org", "/notes/index.org");
        assert!(doc.error.is_none());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(doc.get("TITLE"), "loop");
    }

    #[test]
    fn setup_chains_stop_at_depth_limit() {
        // every file points at a new one, so only the depth limit ends the chain
        let config = Configuration::new().with_reader(|p: &Path| -> io::Result<Vec<u8>> {
            let name = p.file_stem().map_or(String::new(), |s| s.to_string_lossy().into_owned());
            Ok(format!("#+SETUPFILE: {name}x.org\n#+TITLE: {name}").into_bytes())
        });
        let doc = config.parse("#+SETUPFILE: a.org", "/notes/index.org");
        assert!(doc.error.is_none());
        let titles: Vec<_> = doc.get("TITLE").lines().collect();
        assert_eq!(titles.len(), MAX_SETUP_DEPTH);
        assert_eq!(titles.last(), Some(&"a"));
    }

    #[test]
    fn include_reads_only_when_resolved() {
        let (reads, reader) = counting_reader("body\n");
        let config = Configuration::new().with_reader(reader);
        let doc = config.parse("#+INCLUDE: \"notes.txt\" example text", "/notes/index.org");
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        let nodes = doc.nodes.as_deref().expect("nodes");
        let [Node::Include(include)] = nodes else {
            panic!("expected include, got {nodes:?}");
        };
        let Node::Block(block) = include.resolve(&config) else {
            panic!("expected block");
        };
        assert_eq!(block.name, "EXAMPLE");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn include_is_resolved_lazily() {
        let config = Configuration::new()
            .with_reader(files(&[("/notes/code/main.rs", "fn main() {}\n")]));
        let doc = config.parse(
            "#+INCLUDE: \"code/main.rs\" src rust\n#+INCLUDE: whatever",
            "/notes/index.org",
        );
        let nodes = doc.nodes.as_deref().expect("nodes");
        let [Node::Include(good), Node::Include(bad)] = nodes else {
            panic!("expected two includes, got {nodes:?}");
        };
        assert_eq!(
            good.resolve(&config),
            Node::Block(Block {
                name: "SRC".into(),
                parameters: vec!["rust".into()],
                content: BlockContent::Raw("fn main() {}\n".into()),
                result: None,
            })
        );
        assert_eq!(bad.resolve(&config), Node::Keyword(bad.keyword.clone()));

        let empty = Configuration::new().with_reader(files(&[]));
        assert_eq!(good.resolve(&empty), Node::Keyword(good.keyword.clone()));
    }

    #[test]
    fn repeated_settings_join_lines() {
        let config = Configuration::new();
        let doc = config.parse("#+title: A\n#+TITLE: B", "./");
        assert_eq!(doc.get("TITLE"), "A\nB");
    }
}
