//! Node types produced by the parser.
//!
//! The tree is a closed set of [`Node`] variants; inline content (titles, paragraph
//! text, captions, table cells) is a separate [`Inline`] sequence.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;
use std::{fmt, path::Path, path::PathBuf};

/* -------------------------------- Nodes -------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Node {
    Headline(Headline),
    Paragraph(Paragraph),
    List(List),
    Table(Table),
    Block(Block),
    Result(ResultNode),
    Drawer(Drawer),
    PropertyDrawer(PropertyDrawer),
    Example(Example),
    HorizontalRule,
    Comment(Comment),
    Keyword(Keyword),
    Include(Include),
    NodeWithMeta(NodeWithMeta),
    FootnoteDefinition(FootnoteDefinition),
    Agenda(Agenda),
}

impl Node {
    /// Short variant name, used for structural comparisons and CLI output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Headline(_) => "headline",
            Node::Paragraph(_) => "paragraph",
            Node::List(_) => "list",
            Node::Table(_) => "table",
            Node::Block(_) => "block",
            Node::Result(_) => "result",
            Node::Drawer(_) => "drawer",
            Node::PropertyDrawer(_) => "propertyDrawer",
            Node::Example(_) => "example",
            Node::HorizontalRule => "horizontalRule",
            Node::Comment(_) => "comment",
            Node::Keyword(_) => "keyword",
            Node::Include(_) => "include",
            Node::NodeWithMeta(_) => "nodeWithMeta",
            Node::FootnoteDefinition(_) => "footnoteDefinition",
            Node::Agenda(_) => "agenda",
        }
    }
}

/* ------------------------------- Headline ------------------------------- */

/// A headline together with everything up to the next headline of the same or lower level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Headline {
    /// 1-based position in document order.
    pub index: usize,
    pub level: usize,
    /// Dotted section number such as `2.1`.
    pub number: String,
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub properties: Option<PropertyDrawer>,
    pub agenda: Option<Agenda>,
    pub title: Vec<Inline>,
    pub tags: Vec<String>,
    pub children: Vec<Node>,
}

impl Headline {
    /// `CUSTOM_ID` property if present, otherwise `headline-<index>`.
    pub fn id(&self) -> String {
        self.properties
            .as_ref()
            .and_then(|p| p.get("CUSTOM_ID"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("headline-{}", self.index))
    }
}

/// Single-letter priority, e.g. `[#A]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Priority(pub char);

/* -------------------------------- Agenda -------------------------------- */

/// Planning markers (CLOSED/DEADLINE/SCHEDULED) of one line, keyed by upper-cased marker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Agenda {
    pub logs: IndexMap<String, Timestamp>,
}

impl Agenda {
    pub fn get(&self, marker: &str) -> Option<&Timestamp> {
        self.logs.get(&marker.to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub value: NaiveDateTime,
    /// True when the source had no time of day.
    pub is_date: bool,
    /// Repeater cookie such as `+1w`, empty when absent.
    pub interval: String,
}

impl Timestamp {
    pub fn date(&self) -> NaiveDate {
        self.value.date()
    }
}

/* --------------------------- Keywords & metadata --------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub content: String,
}

/// `#+KEY: value` with the key upper-cased and the value trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyword {
    pub key: String,
    pub value: String,
}

/// `#+INCLUDE:` keyword whose content is only read when [`Include::resolve`] is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Include {
    pub keyword: Keyword,
    pub target: IncludeTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IncludeTarget {
    /// Value did not name a file in a supported form; resolves to the keyword itself.
    Literal,
    File {
        path: PathBuf,
        kind: String,
        language: String,
    },
}

/// Affiliated keywords (`NAME`, `CAPTION`, `ATTR_HTML`) collected for the following node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Metadata {
    pub name: Option<String>,
    pub captions: Vec<Vec<Inline>>,
    /// One flat `[key, value, key, value, ..]` group per `ATTR_HTML` line.
    pub html_attributes: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeWithMeta {
    pub node: Box<Node>,
    pub meta: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkType {
    Table,
    Figure,
    Code,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkType::Table => "Table",
            LinkType::Figure => "Figure",
            LinkType::Code => "Code",
        })
    }
}

/// Cross-reference registry entry for a named table, figure or code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InnerLink {
    pub index: usize,
    pub name: String,
    pub kind: LinkType,
}

impl InnerLink {
    /// Human readable label, e.g. `Table 2`.
    pub fn description(&self) -> String {
        format!("{} {}", self.kind, self.index)
    }

    /// Fragment anchor, e.g. `#table--results`.
    pub fn link(&self) -> String {
        format!("#{}--{}", self.kind.to_string().to_lowercase(), self.name)
    }
}

/* ---------------------------- Sibling constructs ---------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Paragraph {
    pub children: Vec<Inline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct List {
    pub kind: ListKind,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListKind {
    Unordered,
    Ordered,
    Descriptive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub bullet: String,
    pub checkbox: Option<Checkbox>,
    /// Term of a descriptive item (`- term :: details`).
    pub term: Option<Vec<Inline>>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Checkbox {
    Empty,   // [ ]
    Partial, // [-]
    Checked, // [X]
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Table {
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub cells: Vec<Vec<Inline>>,
    pub is_separator: bool,
}

/// `#+BEGIN_NAME` .. `#+END_NAME`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Upper-cased block name (`SRC`, `QUOTE`, ..).
    pub name: String,
    pub parameters: Vec<String>,
    pub content: BlockContent,
    /// `#+RESULTS:` attached to a source block.
    pub result: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BlockContent {
    Raw(String),
    Nodes(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultNode {
    pub node: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drawer {
    pub name: String,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PropertyDrawer {
    pub properties: IndexMap<String, String>,
}

impl PropertyDrawer {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Example {
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FootnoteDefinition {
    pub name: String,
    pub children: Vec<Node>,
}

/* ----------------------------- Inline content ----------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Inline {
    Text(String),
    Emphasis {
        kind: Emphasis,
        children: Vec<Inline>,
    },
    Code(String),
    Verbatim(String),
    Link(RegularLink),
    Target(String),      // <<target>>
    FootnoteRef(String), // [fn:1]
    Entity(String),      // \alpha
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Emphasis {
    Bold,
    Italic,
    Underline,
    Strike,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegularLink {
    /// Text before the first `:` of the target (`https`, `file`, `id`, ..), may be empty.
    pub protocol: String,
    /// Full link target as written.
    pub url: String,
    pub description: Option<Vec<Inline>>,
    /// Recognised in running text rather than written as `[[..]]`.
    pub auto_link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkKind {
    Regular,
    Image,
    Video,
}

impl RegularLink {
    pub fn kind(&self) -> LinkKind {
        let local = |p: &str| matches!(p, "" | "file" | "http" | "https");
        if let Some(description) = &self.description {
            let text = plain_text(description);
            let protocol = text.split(':').next().unwrap_or_default();
            if protocol != text && local(protocol) {
                if let Some(kind) = media_kind(&text) {
                    return kind;
                }
            }
            return LinkKind::Regular;
        }
        if !local(&self.protocol) {
            return LinkKind::Regular;
        }
        media_kind(&self.url).unwrap_or(LinkKind::Regular)
    }

    pub fn is_image_or_video(&self) -> bool {
        matches!(self.kind(), LinkKind::Image | LinkKind::Video)
    }
}

fn media_kind(target: &str) -> Option<LinkKind> {
    let ext = Path::new(target).extension()?.to_str()?;
    match ext {
        "png" | "gif" | "jpg" | "jpeg" | "svg" | "tif" | "tiff" => Some(LinkKind::Image),
        "webm" | "mp4" => Some(LinkKind::Video),
        _ => None,
    }
}

/// Plain text approximation of inline content (markup stripped).
pub fn plain_text(inlines: &[Inline]) -> String {
    fn rec(xs: &[Inline], out: &mut String) {
        for x in xs {
            match x {
                Inline::Text(t) => out.push_str(t),
                Inline::Emphasis { children, .. } => rec(children, out),
                Inline::Code(t) | Inline::Verbatim(t) => out.push_str(t),
                Inline::Link(RegularLink {
                    description: Some(d),
                    ..
                }) => rec(d, out),
                Inline::Link(RegularLink { url, .. }) => out.push_str(url),
                Inline::Target(t) | Inline::FootnoteRef(t) | Inline::Entity(t) => {
                    out.push_str(t)
                }
            }
        }
    }
    let mut s = String::new();
    rec(inlines, &mut s);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(protocol: &str, url: &str, description: Option<&str>) -> RegularLink {
        RegularLink {
            protocol: protocol.into(),
            url: url.into(),
            description: description.map(|d| vec![Inline::Text(d.into())]),
            auto_link: false,
        }
    }

    #[test]
    fn link_kind_uses_url_extension() {
        assert_eq!(link("file", "file:img/a.png", None).kind(), LinkKind::Image);
        assert_eq!(link("https", "https://x.org/clip.mp4", None).kind(), LinkKind::Video);
        assert_eq!(link("", "notes.org", None).kind(), LinkKind::Regular);
        assert_eq!(link("id", "id:a.png", None).kind(), LinkKind::Regular);
    }

    #[test]
    fn link_kind_with_description() {
        assert_eq!(
            link("https", "https://x.org", Some("file:thumb.jpg")).kind(),
            LinkKind::Image
        );
        assert_eq!(
            link("file", "file:a.png", Some("a picture")).kind(),
            LinkKind::Regular
        );
    }

    #[test]
    fn inner_link_labels() {
        let l = InnerLink {
            index: 2,
            name: "results".into(),
            kind: LinkType::Table,
        };
        assert_eq!(l.description(), "Table 2");
        assert_eq!(l.link(), "#table--results");
    }

    #[test]
    fn headline_id_prefers_custom_id() {
        let mut h = Headline {
            index: 3,
            level: 1,
            number: "3".into(),
            status: None,
            priority: None,
            properties: None,
            agenda: None,
            title: vec![],
            tags: vec![],
            children: vec![],
        };
        assert_eq!(h.id(), "headline-3");
        let mut props = PropertyDrawer::default();
        props.properties.insert("CUSTOM_ID".into(), "intro".into());
        h.properties = Some(props);
        assert_eq!(h.id(), "intro");
    }
}
