use super::{PResult, Stop};
use crate::core::{Headline, Node, Priority};
use crate::document::Document;
use crate::lexer::Token;
use regex::Regex;
use std::sync::LazyLock;

static TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*?)\s+(:[A-Za-z0-9_@#%:]+:\s*$)").unwrap());

/// Title of the section that holds footnote definitions; it never becomes a headline.
const FOOTNOTE_SECTION: &str = "Footnotes";

impl Document<'_> {
    pub(crate) fn parse_headline(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let t = self.token(i)?;
        if t.content == FOOTNOTE_SECTION {
            return Ok((1, None));
        }
        let level = t.capture(1).len();
        let mut text = t.content.clone();

        let (section, index, number) = self.outline.add_headline(level);

        let status = self.strip_status(&mut text);
        let priority = strip_priority(&mut text);
        let tags = strip_tags(&mut text);
        let title = self.parse_inline(&text);

        let stop = |t: &[Token], i: usize| {
            parent_stop(t, i)
                || t.get(i)
                    .and_then(Token::headline_level)
                    .is_some_and(|l| l <= level)
        };
        let (consumed, nodes) = self.parse_many(i + 1, &stop)?;

        let mut nodes = nodes.into_iter().peekable();
        let agenda = nodes
            .next_if(|n| matches!(n, Node::Agenda(_)))
            .and_then(|n| match n {
                Node::Agenda(a) => Some(a),
                _ => None,
            });
        let properties = nodes
            .next_if(|n| matches!(n, Node::PropertyDrawer(_)))
            .and_then(|n| match n {
                Node::PropertyDrawer(p) => Some(p),
                _ => None,
            });

        self.outline
            .describe(section, status.clone(), title.clone(), tags.clone());
        Ok((
            consumed + 1,
            Some(Node::Headline(Headline {
                index,
                level,
                number,
                status,
                priority,
                properties,
                agenda,
                title,
                tags,
                children: nodes.collect(),
            })),
        ))
    }

    /// Remove a leading TODO keyword from `text`. Shortcuts such as `TODO(t)` match `TODO`.
    fn strip_status(&self, text: &mut String) -> Option<String> {
        let keywords = self
            .get("TODO")
            .split(|c: char| c.is_whitespace() || c == '|')
            .filter(|k| !k.is_empty())
            .map(|k| k.rfind('(').map_or(k, |idx| &k[..idx]));
        for keyword in keywords {
            let followed_by_space = text
                .get(keyword.len()..)
                .and_then(|rest| rest.chars().next())
                .is_some_and(char::is_whitespace);
            if !keyword.is_empty() && text.starts_with(keyword) && followed_by_space {
                let status = keyword.to_string();
                let rest = text[keyword.len()..].trim_start().to_string();
                *text = rest;
                return Some(status);
            }
        }
        None
    }
}

/// `[#A]`, `[#B]` or `[#C]` at the start of `text`.
fn strip_priority(text: &mut String) -> Option<Priority> {
    let bytes = text.as_bytes();
    if bytes.len() >= 4
        && bytes.starts_with(b"[#")
        && matches!(bytes[2], b'A' | b'B' | b'C')
        && bytes[3] == b']'
    {
        let priority = Priority(char::from(bytes[2]));
        *text = text[4..].trim().to_string();
        return Some(priority);
    }
    None
}

fn strip_tags(text: &mut String) -> Vec<String> {
    let Some(caps) = TAGS.captures(text) else {
        return vec![];
    };
    let tags = caps[2]
        .trim()
        .split(':')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    let title = caps[1].to_string();
    *text = title;
    tags
}

impl Headline {
    /// True when one of the tags is listed in the document's `EXCLUDE_TAGS`.
    pub fn is_excluded(&self, doc: &Document<'_>) -> bool {
        doc.get("EXCLUDE_TAGS")
            .split_whitespace()
            .any(|excluded| self.tags.iter().any(|t| t == excluded))
    }
}
