use super::{PResult, Stop, trim_indent_up_to};
use crate::core::{Block, BlockContent, Node, ResultNode};
use crate::document::Document;
use crate::lexer::{Token, TokenKind};

/// Blocks whose body is kept verbatim instead of being parsed.
fn is_raw(name: &str) -> bool {
    matches!(name, "SRC" | "EXAMPLE" | "EXPORT")
}

impl Document<'_> {
    /// `#+BEGIN_NAME params` .. `#+END_NAME`. Declines when the end line is missing.
    pub(crate) fn parse_block(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let t = self.token(i)?;
        let (name, indent, start) = (t.content.clone(), t.level, i);
        let parameters = split_parameters(t.capture(3));

        let is_end = |t: &[Token], j: usize| {
            t.get(j)
                .is_some_and(|t| t.kind == TokenKind::EndBlock && t.content == name)
        };
        let Some(end) = (i + 1..self.tokens.len()).find(|&j| is_end(&self.tokens, j)) else {
            return Ok((0, None));
        };

        let content = if is_raw(&name) {
            let raw = self.tokens[i + 1..end]
                .iter()
                .map(|t| format!("{}\n", trim_indent_up_to(&t.source, indent)))
                .collect();
            BlockContent::Raw(raw)
        } else {
            let stop = |_: &[Token], j: usize| j >= end;
            let (_, nodes) = self.parse_many(i + 1, &stop)?;
            BlockContent::Nodes(nodes)
        };

        let mut i = end + 1;
        let mut result = None;
        if name == "SRC" {
            let (consumed, node) = self.parse_src_result(i, parent_stop)?;
            i += consumed;
            result = node.map(Box::new);
        }
        Ok((
            i - start,
            Some(Node::Block(Block {
                name,
                parameters,
                content,
                result,
            })),
        ))
    }

    /// A `#+RESULTS:` following a source block, possibly after blank lines.
    fn parse_src_result(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let mut j = i;
        while !parent_stop(&self.tokens, j) && self.tokens.get(j).is_some_and(Token::is_blank) {
            j += 1;
        }
        let is_result = self
            .tokens
            .get(j)
            .is_some_and(|t| t.kind == TokenKind::Result);
        if parent_stop(&self.tokens, j) || !is_result {
            return Ok((0, None));
        }
        let (consumed, node) = self.parse_result(j, parent_stop)?;
        Ok((j - i + consumed, node))
    }

    /// `#+RESULTS:` and the node right after it.
    pub(crate) fn parse_result(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let next = i + 1;
        if next >= self.tokens.len() || parent_stop(&self.tokens, next) {
            return Ok((1, Some(Node::Result(ResultNode { node: None }))));
        }
        let (consumed, node) = self.parse_one(next, parent_stop)?;
        Ok((
            consumed + 1,
            Some(Node::Result(ResultNode {
                node: node.map(Box::new),
            })),
        ))
    }
}

/// `rust :results output :exports both` → `[rust, :results, output, :exports, both]`.
///
/// Header arguments keep multi-word values together.
pub(crate) fn split_parameters(s: &str) -> Vec<String> {
    let mut parts = s.split(" :");
    let mut parameters = Vec::new();
    let lang = parts.next().unwrap_or_default().trim();
    if let Some(rest) = lang.strip_prefix(':') {
        // header arguments without a language
        let (key, value) = rest.split_once(' ').unwrap_or((rest, ""));
        parameters.push(format!(":{key}"));
        parameters.push(value.trim().to_string());
    } else if !lang.is_empty() {
        parameters.push(lang.to_string());
    }
    for part in parts {
        let (key, value) = part.split_once(' ').unwrap_or((part, ""));
        parameters.push(format!(":{key}"));
        parameters.push(value.trim().to_string());
    }
    parameters
}
