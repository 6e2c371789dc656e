use super::{PResult, Stop};
use crate::core::{Drawer, Inline, Node, Paragraph, PropertyDrawer};
use crate::document::Document;
use crate::lexer::{Token, TokenKind};
use regex::Regex;
use std::sync::LazyLock;

static PROPERTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*):(\S+):(\s+(.*)$|$)").unwrap());

impl Document<'_> {
    /// `:NAME:` .. `:END:`. Declines when `:END:` is missing.
    pub(crate) fn parse_drawer(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let name = self.token(i)?.content.to_uppercase();
        if name == "PROPERTIES" {
            return self.parse_property_drawer(i, parent_stop);
        }

        let inside = |t: &[Token], j: usize| {
            !parent_stop(t, j)
                && t.get(j).is_some_and(|t| {
                    !matches!(t.kind, TokenKind::EndDrawer | TokenKind::Headline)
                })
        };
        let mut end = i + 1;
        while inside(&self.tokens, end) {
            end += 1;
        }
        let closed = !parent_stop(&self.tokens, end)
            && self
                .tokens
                .get(end)
                .is_some_and(|t| t.kind == TokenKind::EndDrawer);
        if !closed {
            return Ok((0, None));
        }

        let stop = |t: &[Token], j: usize| {
            j >= end || t.get(j).is_some_and(|t| t.kind == TokenKind::BeginDrawer)
        };
        let mut children = Vec::new();
        let mut j = i + 1;
        while j < end {
            let (consumed, nodes) = self.parse_many(j, &stop)?;
            j += consumed;
            children.extend(nodes);
            // nested drawers are not supported, keep the line as text
            if j < end {
                let line = self.token(j)?.source.trim().to_string();
                children.push(Node::Paragraph(Paragraph {
                    children: vec![Inline::Text(line)],
                }));
                j += 1;
            }
        }
        Ok((j.max(end + 1) - i, Some(Node::Drawer(Drawer { name, children }))))
    }

    fn parse_property_drawer(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let start = i;
        let mut drawer = PropertyDrawer::default();
        let mut i = i + 1;
        while !parent_stop(&self.tokens, i) {
            let Some(t) = self.tokens.get(i) else { break };
            if !matches!(t.kind, TokenKind::Text | TokenKind::BeginDrawer) {
                break;
            }
            let Some(caps) = PROPERTY.captures(&t.source) else {
                return Ok((0, None));
            };
            let key = caps[2].to_uppercase();
            let value = caps.get(4).map_or("", |m| m.as_str()).trim().to_string();
            drawer.properties.insert(key, value);
            i += 1;
        }
        match self.tokens.get(i) {
            Some(t) if t.kind == TokenKind::EndDrawer && !parent_stop(&self.tokens, i) => {
                Ok((i + 1 - start, Some(Node::PropertyDrawer(drawer))))
            }
            _ => Ok((0, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn nodes(input: &str) -> Vec<Node> {
        let config = Configuration::new();
        config.parse(input, "./").nodes.expect("nodes")
    }

    #[test]
    fn property_drawer_keeps_order_and_upper_cases_keys() {
        let ns = nodes(":PROPERTIES:\n:custom_id: intro\n:Empty:\n:END:");
        let [Node::PropertyDrawer(d)] = ns.as_slice() else {
            panic!("expected property drawer, got {ns:?}");
        };
        let keys: Vec<_> = d.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, ["CUSTOM_ID", "EMPTY"]);
        assert_eq!(d.get("CUSTOM_ID"), Some("intro"));
        assert_eq!(d.get("EMPTY"), Some(""));
    }

    #[test]
    fn malformed_property_line_declines() {
        let ns = nodes(":PROPERTIES:\nnot a property\n:END:");
        assert!(ns.iter().all(|n| n.kind_name() == "paragraph"));
    }

    #[test]
    fn generic_drawer_parses_children() {
        let ns = nodes(":LOGBOOK:\n- State \"DONE\"\n:END:\nafter");
        let [Node::Drawer(d), Node::Paragraph(_)] = ns.as_slice() else {
            panic!("expected drawer then paragraph, got {ns:?}");
        };
        assert_eq!(d.name, "LOGBOOK");
        assert_eq!(d.children[0].kind_name(), "list");
    }

    #[test]
    fn unclosed_drawer_is_text() {
        let ns = nodes(":NOTES:\nsome text\n* Headline");
        assert_eq!(ns[0].kind_name(), "paragraph");
        assert_eq!(ns[1].kind_name(), "headline");
    }
}
