use super::{PResult, Stop, is_second_blank_line};
use crate::core::{Checkbox, List, ListItem, ListKind, Node};
use crate::document::Document;
use crate::error::OrgError;
use crate::lexer::{self, Token, TokenKind};
use regex::Regex;
use std::sync::LazyLock;

static DESCRIPTIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s::(\s|$)").unwrap());
static CHECKBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[( |X|-)\](?:\s+(.*)|$)").unwrap());

fn list_kind(t: &Token) -> Option<ListKind> {
    if !t.is_list() {
        return None;
    }
    Some(match t.kind {
        TokenKind::OrderedList => ListKind::Ordered,
        _ if DESCRIPTIVE.is_match(&t.content) => ListKind::Descriptive,
        _ => ListKind::Unordered,
    })
}

impl Document<'_> {
    /// Consecutive items of one kind at one indent.
    pub(crate) fn parse_list(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let t = self.token(i)?;
        let (level, start) = (t.level, i);
        let Some(kind) = list_kind(t) else {
            return Ok((0, None));
        };
        let continues = |t: &[Token], j: usize| {
            !parent_stop(t, j)
                && t.get(j)
                    .is_some_and(|t| t.level == level && list_kind(t) == Some(kind))
        };

        let mut items = Vec::new();
        let mut i = i;
        while continues(&self.tokens, i) {
            let (consumed, item) = self.parse_list_item(kind, i, parent_stop)?;
            i += consumed;
            items.push(item);
        }
        if items.is_empty() {
            return Ok((0, None));
        }
        Ok((i - start, Some(Node::List(List { kind, items }))))
    }

    /// One item: everything indented deeper than its bullet, blank lines included,
    /// up to a second consecutive blank line.
    fn parse_list_item(
        &mut self,
        kind: ListKind,
        i: usize,
        parent_stop: &Stop<'_>,
    ) -> Result<(usize, ListItem), OrgError> {
        let t = self.token(i)?;
        let start = i;
        let bullet = t.capture(2).to_string();
        let min_indent = t.level + bullet.len();
        let mut content = t.content.clone();
        let source = t.source.clone();
        let original_base = self.base_level;
        self.base_level = min_indent + 1;

        let mut checkbox = None;
        if let Some(caps) = CHECKBOX.captures(&content) {
            checkbox = match &caps[1] {
                "X" => Some(Checkbox::Checked),
                "-" => Some(Checkbox::Partial),
                _ => Some(Checkbox::Empty),
            };
            content = caps.get(2).map_or("", |m| m.as_str()).to_string();
        }

        let mut term = None;
        if kind == ListKind::Descriptive {
            if let Some(m) = DESCRIPTIVE.find(&content) {
                let text = content[..m.start()].to_string();
                content = content[m.end()..].to_string();
                term = Some(self.parse_inline(&text));
                if let Some(idx) = source.find(" ::") {
                    self.base_level = idx + 4;
                }
            }
        }

        // the item text becomes an ordinary line at the content column
        self.tokens[i] = lexer::tokenize(&format!("{}{}", " ".repeat(min_indent), content))?;

        let stop = |t: &[Token], j: usize| {
            parent_stop(t, j)
                || t.get(j)
                    .is_some_and(|t| t.level < min_indent && !t.is_blank())
        };
        let mut children = Vec::new();
        let mut j = i;
        // the item line itself is always part of the item
        while j < self.tokens.len()
            && (j == start
                || !stop(&self.tokens, j) && !is_second_blank_line(&self.tokens, j))
        {
            let (consumed, node) = self.parse_one(j, &stop)?;
            j += consumed;
            children.extend(node);
        }
        self.base_level = original_base;
        Ok((
            j - start,
            ListItem {
                bullet,
                checkbox,
                term,
                children,
            },
        ))
    }
}
