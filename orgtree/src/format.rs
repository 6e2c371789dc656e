//! Rendering parsed nodes.
//!
//! [`Writer`] is the extension point used by [`Document::write`]; [`OrgWriter`] renders
//! nodes back to Org syntax. Output is normalised (aligned tables, canonical timestamps)
//! rather than byte-identical to the input, but parses back to the same structure.

use crate::core::*;
use crate::document::Document;
use crate::error::OrgError;
use std::fmt::{self, Write};

/// Export backend driven by [`Document::write`].
pub trait Writer {
    fn before(&mut self, _doc: &Document<'_>) -> Result<(), OrgError> {
        Ok(())
    }

    fn after(&mut self, _doc: &Document<'_>) -> Result<(), OrgError> {
        Ok(())
    }

    /// Called once per top-level node, in document order.
    fn write_node(&mut self, node: &Node) -> Result<(), OrgError>;

    fn finish(self) -> String;
}

/// Pretty printer producing Org syntax.
#[derive(Debug, Default)]
pub struct OrgWriter {
    out: String,
    indent: String,
    /// Kind of the previously written sibling, for blank line separation.
    last: Option<&'static str>,
}

impl OrgWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn nested(indent: String) -> Self {
        Self {
            out: String::new(),
            indent,
            last: None,
        }
    }

    fn write_nodes(&mut self, nodes: &[Node]) -> fmt::Result {
        let saved = self.last.take();
        for node in nodes {
            self.node(node)?;
        }
        self.last = saved;
        Ok(())
    }

    fn node(&mut self, node: &Node) -> fmt::Result {
        if let Some(blank_lines) = separation(self.last, node) {
            for _ in 0..blank_lines {
                self.out.push('\n');
            }
        }
        self.last = Some(trailing_kind(node));
        match node {
            Node::Headline(h) => self.headline(h),
            Node::Paragraph(p) => self.paragraph(&p.children),
            Node::List(l) => self.list(l),
            Node::Table(t) => self.table(t),
            Node::Block(b) => self.block(b),
            Node::Result(r) => self.result(r),
            Node::Drawer(d) => {
                writeln!(self.out, "{}:{}:", self.indent, d.name)?;
                self.write_nodes(&d.children)?;
                writeln!(self.out, "{}:END:", self.indent)
            }
            Node::PropertyDrawer(d) => self.properties(d),
            Node::Example(e) => {
                for line in &e.lines {
                    if line.is_empty() {
                        writeln!(self.out, "{}:", self.indent)?;
                    } else {
                        writeln!(self.out, "{}: {}", self.indent, line)?;
                    }
                }
                Ok(())
            }
            Node::HorizontalRule => writeln!(self.out, "{}-----", self.indent),
            Node::Comment(c) => writeln!(self.out, "{}# {}", self.indent, c.content),
            Node::Keyword(k) => self.keyword(k),
            Node::Include(i) => self.keyword(&i.keyword),
            Node::NodeWithMeta(n) => {
                let meta = &n.meta;
                if let Some(name) = &meta.name {
                    writeln!(self.out, "{}#+NAME: {}", self.indent, name)?;
                }
                for caption in &meta.captions {
                    writeln!(self.out, "{}#+CAPTION: {}", self.indent, render_inline(caption))?;
                }
                for attributes in &meta.html_attributes {
                    writeln!(self.out, "{}#+ATTR_HTML: {}", self.indent, attributes.join(" "))?;
                }
                self.last = None;
                self.node(&n.node)
            }
            Node::FootnoteDefinition(f) => {
                let mut body = OrgWriter::nested(self.indent.clone());
                body.write_nodes(&f.children)?;
                let content = body.out.strip_prefix(self.indent.as_str()).unwrap_or(&body.out);
                if content.is_empty() {
                    writeln!(self.out, "{}[fn:{}]", self.indent, f.name)
                } else {
                    write!(self.out, "{}[fn:{}] {}", self.indent, f.name, content)
                }
            }
            Node::Agenda(a) => self.agenda(a),
        }
    }

    fn headline(&mut self, h: &Headline) -> fmt::Result {
        self.out.push_str(&"*".repeat(h.level.max(1)));
        if let Some(status) = &h.status {
            write!(self.out, " {status}")?;
        }
        if let Some(Priority(p)) = h.priority {
            write!(self.out, " [#{p}]")?;
        }
        let title = render_inline(&h.title);
        if !title.is_empty() {
            write!(self.out, " {title}")?;
        }
        if !h.tags.is_empty() {
            write!(self.out, " :{}:", h.tags.join(":"))?;
        }
        self.out.push('\n');
        if let Some(agenda) = &h.agenda {
            self.agenda(agenda)?;
        }
        if let Some(properties) = &h.properties {
            self.properties(properties)?;
        }
        self.write_nodes(&h.children)
    }

    fn agenda(&mut self, agenda: &Agenda) -> fmt::Result {
        let markers: Vec<String> = agenda
            .logs
            .iter()
            .map(|(marker, ts)| format!("{marker}: {}", render_timestamp(marker, ts)))
            .collect();
        writeln!(self.out, "{}{}", self.indent, markers.join(" "))
    }

    fn properties(&mut self, drawer: &PropertyDrawer) -> fmt::Result {
        writeln!(self.out, "{}:PROPERTIES:", self.indent)?;
        for (key, value) in &drawer.properties {
            if value.is_empty() {
                writeln!(self.out, "{}:{}:", self.indent, key)?;
            } else {
                writeln!(self.out, "{}:{}: {}", self.indent, key, value)?;
            }
        }
        writeln!(self.out, "{}:END:", self.indent)
    }

    fn keyword(&mut self, k: &Keyword) -> fmt::Result {
        if k.value.is_empty() {
            writeln!(self.out, "{}#+{}:", self.indent, k.key)
        } else {
            writeln!(self.out, "{}#+{}: {}", self.indent, k.key, k.value)
        }
    }

    fn paragraph(&mut self, inlines: &[Inline]) -> fmt::Result {
        let text = render_inline(inlines);
        for line in text.split('\n') {
            writeln!(self.out, "{}{}", self.indent, line)?;
        }
        Ok(())
    }

    fn list(&mut self, list: &List) -> fmt::Result {
        for item in &list.items {
            let mut body = OrgWriter::nested(format!("{}{}", self.indent, " ".repeat(item.bullet.len() + 1)));
            body.write_nodes(&item.children)?;
            let content = body.out.strip_prefix(body.indent.as_str()).unwrap_or(&body.out);

            write!(self.out, "{}{}", self.indent, item.bullet)?;
            match item.checkbox {
                Some(Checkbox::Empty) => self.out.push_str(" [ ]"),
                Some(Checkbox::Partial) => self.out.push_str(" [-]"),
                Some(Checkbox::Checked) => self.out.push_str(" [X]"),
                None => {}
            }
            if let Some(term) = &item.term {
                write!(self.out, " {} ::", render_inline(term))?;
            }
            if content.is_empty() {
                self.out.push('\n');
            } else if content.starts_with('\n') {
                self.out.push_str(content);
            } else {
                write!(self.out, " {content}")?;
            }
        }
        Ok(())
    }

    fn table(&mut self, table: &Table) -> fmt::Result {
        let rendered: Vec<Option<Vec<String>>> = table
            .rows
            .iter()
            .map(|row| {
                (!row.is_separator).then(|| row.cells.iter().map(|c| render_inline(c)).collect())
            })
            .collect();
        let columns = rendered.iter().flatten().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0; columns];
        for cells in rendered.iter().flatten() {
            for (w, cell) in widths.iter_mut().zip(cells) {
                *w = (*w).max(cell.chars().count());
            }
        }
        for row in &rendered {
            match row {
                Some(cells) => {
                    let padded: Vec<String> = widths
                        .iter()
                        .enumerate()
                        .map(|(idx, &w)| {
                            let cell = cells.get(idx).map_or("", String::as_str);
                            format!(" {cell}{} ", " ".repeat(w - cell.chars().count()))
                        })
                        .collect();
                    writeln!(self.out, "{}|{}|", self.indent, padded.join("|"))?;
                }
                None => {
                    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
                    writeln!(self.out, "{}|{}|", self.indent, dashes.join("+"))?;
                }
            }
        }
        Ok(())
    }

    fn block(&mut self, b: &Block) -> fmt::Result {
        write!(self.out, "{}#+BEGIN_{}", self.indent, b.name)?;
        let parameters: Vec<&str> = b
            .parameters
            .iter()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .collect();
        if !parameters.is_empty() {
            write!(self.out, " {}", parameters.join(" "))?;
        }
        self.out.push('\n');
        match &b.content {
            BlockContent::Raw(raw) => {
                for line in raw.lines() {
                    if line.is_empty() {
                        self.out.push('\n');
                    } else {
                        writeln!(self.out, "{}{}", self.indent, line)?;
                    }
                }
            }
            BlockContent::Nodes(nodes) => self.write_nodes(nodes)?,
        }
        writeln!(self.out, "{}#+END_{}", self.indent, b.name)?;
        if let Some(result) = &b.result {
            self.out.push('\n');
            self.node(result)?;
        }
        Ok(())
    }

    fn result(&mut self, r: &ResultNode) -> fmt::Result {
        writeln!(self.out, "{}#+RESULTS:", self.indent)?;
        if let Some(node) = &r.node {
            self.last = None;
            self.node(node)?;
        }
        Ok(())
    }
}

impl Writer for OrgWriter {
    fn write_node(&mut self, node: &Node) -> Result<(), OrgError> {
        self.node(node)
            .map_err(|err| OrgError::Write(err.to_string()))
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Blank lines needed between two siblings so they parse back as separate nodes.
fn separation(last: Option<&'static str>, next: &Node) -> Option<usize> {
    let next = match next {
        Node::NodeWithMeta(_) => "keyword",
        other => other.kind_name(),
    };
    match (last?, next) {
        // without the blank line the next node would absorb or attach to the previous one
        ("footnoteDefinition" | "affiliated" | "emptyResult", _) => Some(1),
        // a single blank line would continue the previous list item
        ("list", "list") => Some(2),
        (a, b) if a == b && matches!(a, "paragraph" | "table" | "example") => Some(1),
        _ => None,
    }
}

/// Kind of the construct that ends `node`'s rendering.
fn trailing_kind(node: &Node) -> &'static str {
    match node {
        Node::NodeWithMeta(n) => trailing_kind(&n.node),
        Node::Keyword(k) if matches!(k.key.as_str(), "NAME" | "CAPTION" | "ATTR_HTML") => {
            "affiliated"
        }
        Node::Result(ResultNode { node: Some(n) }) => trailing_kind(n),
        Node::Result(ResultNode { node: None }) => "emptyResult",
        Node::Block(Block {
            result: Some(result),
            ..
        }) => trailing_kind(result),
        other => other.kind_name(),
    }
}

fn render_timestamp(marker: &str, ts: &Timestamp) -> String {
    let (open, close) = if marker == "CLOSED" { ('[', ']') } else { ('<', '>') };
    let format = if ts.is_date { "%Y-%m-%d %a" } else { "%Y-%m-%d %a %H:%M" };
    let mut s = format!("{open}{}", ts.value.format(format));
    if !ts.interval.is_empty() {
        write!(s, " {}", ts.interval).ok();
    }
    s.push(close);
    s
}

/// Org syntax for inline content.
pub fn render_inline(inlines: &[Inline]) -> String {
    let mut buf = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(t) => buf.push_str(t),
            Inline::Emphasis { kind, children } => {
                let marker = match kind {
                    Emphasis::Bold => '*',
                    Emphasis::Italic => '/',
                    Emphasis::Underline => '_',
                    Emphasis::Strike => '+',
                };
                buf.push(marker);
                buf.push_str(&render_inline(children));
                buf.push(marker);
            }
            Inline::Code(code) => {
                buf.push('~');
                buf.push_str(code);
                buf.push('~');
            }
            Inline::Verbatim(verbatim) => {
                buf.push('=');
                buf.push_str(verbatim);
                buf.push('=');
            }
            Inline::Link(link) if link.auto_link => buf.push_str(&link.url),
            Inline::Link(link) => {
                buf.push_str("[[");
                buf.push_str(&link.url);
                if let Some(desc) = &link.description {
                    buf.push_str("][");
                    buf.push_str(&render_inline(desc));
                }
                buf.push_str("]]");
            }
            Inline::Target(target) => {
                buf.push_str("<<");
                buf.push_str(target);
                buf.push_str(">>");
            }
            Inline::FootnoteRef(label) => {
                buf.push_str("[fn:");
                buf.push_str(label);
                buf.push(']');
            }
            Inline::Entity(entity) => buf.push_str(entity),
        }
    }
    buf
}

/// Render `nodes` as Org syntax.
pub fn to_org_string(nodes: &[Node]) -> String {
    let mut w = OrgWriter::new();
    // writing into a String cannot fail
    let _ = w.write_nodes(nodes);
    w.out
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_org_string(std::slice::from_ref(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn format(input: &str) -> String {
        let config = Configuration::new();
        let doc = config.parse(input, "./");
        doc.write(OrgWriter::new()).expect("write")
    }

    /// Kinds and headline numbers, depth first.
    fn shape(nodes: &[Node]) -> Vec<String> {
        fn walk(nodes: &[Node], out: &mut Vec<String>) {
            for node in nodes {
                match node {
                    Node::Headline(h) => {
                        out.push(format!("headline {}", h.number));
                        walk(&h.children, out);
                    }
                    Node::List(l) => {
                        out.push(format!("list {}", l.items.len()));
                        for item in &l.items {
                            walk(&item.children, out);
                        }
                    }
                    Node::NodeWithMeta(n) => {
                        out.push("meta".into());
                        walk(std::slice::from_ref(&n.node), out);
                    }
                    other => out.push(other.kind_name().into()),
                }
            }
        }
        let mut out = Vec::new();
        walk(nodes, &mut out);
        out
    }

    const SAMPLE: &str = "#+TITLE: Sample
#+OPTIONS: toc:nil

* TODO [#B] First :work:
SCHEDULED: <2024-01-08 Mon +1w>
:PROPERTIES:
:CUSTOM_ID: first
:END:
Some *bold* text
and a [[https://example.com][link]].

Second paragraph.
- one
  - nested
- [X] two

- three

* Second
#+CAPTION: not attached

| z |
** Child
#+NAME: numbers
| a | b |
|---+---|
| 1 | 22 |

#+BEGIN_SRC rust :results output
fn main() {}
#+END_SRC

#+RESULTS:
: done

: example

-----
# comment
[fn:1] A footnote.
";

    #[test]
    fn round_trip_preserves_structure() {
        let config = Configuration::new();
        let first = config.parse(SAMPLE, "./");
        assert!(first.error.is_none(), "{:?}", first.error);
        let printed = first.write(OrgWriter::new()).expect("write");
        let second = config.parse(&printed, "./");
        assert!(second.error.is_none(), "{:?}", second.error);
        let (a, b) = (first.nodes.expect("nodes"), second.nodes.expect("nodes"));
        assert_eq!(shape(&a), shape(&b), "printed:\n{printed}");
        assert_eq!(format(&printed), printed);
    }

    #[test]
    fn detached_affiliated_keywords_stay_detached() {
        let config = Configuration::new();
        for input in [
            "#+NAME: x\n\n| a |",
            "#+CAPTION: x\n\n| a |",
            "#+ATTR_HTML: :width 10\n\n| a |",
            "#+RESULTS:\n\ntext",
        ] {
            let first = config.parse(input, "./");
            let printed = first.write(OrgWriter::new()).expect("write");
            let second = config.parse(&printed, "./");
            let (a, b) = (first.nodes.expect("nodes"), second.nodes.expect("nodes"));
            assert_eq!(a.len(), 2, "{input:?}");
            assert_eq!(shape(&a), shape(&b), "printed:\n{printed}");
        }
    }

    #[test]
    fn headline_rendering() {
        assert_eq!(
            format("* TODO [#A] Title :tag1:tag2:\nCLOSED: [2024-01-02 Tue 10:00] DEADLINE: <2024-01-05>"),
            "* TODO [#A] Title :tag1:tag2:\nCLOSED: [2024-01-02 Tue 10:00] DEADLINE: <2024-01-05 Fri>\n"
        );
    }

    #[test]
    fn tables_are_aligned() {
        assert_eq!(
            format("|a|bbb|\n|-\n|cc|d|"),
            "| a  | bbb |\n|----+-----|\n| cc | d   |\n"
        );
    }

    #[test]
    fn consecutive_paragraphs_stay_apart() {
        assert_eq!(format("one\n\n\ntwo"), "one\n\ntwo\n");
        assert_eq!(format("- a\n\n\n- b"), "- a\n\n\n- b\n");
    }

    #[test]
    fn display_renders_single_node() {
        let node = Node::Keyword(Keyword {
            key: "TITLE".into(),
            value: "x".into(),
        });
        assert_eq!(node.to_string(), "#+TITLE: x\n");
    }

    #[test]
    fn nested_list_items_are_indented() {
        assert_eq!(
            format("1. one\n   more\n   - sub\n2. two"),
            "1. one\n   more\n   - sub\n2. two\n"
        );
    }
}
