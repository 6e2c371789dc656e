use super::{PResult, Stop, trim_indent_up_to};
use crate::core::{Example, FootnoteDefinition, Node, Paragraph};
use crate::document::Document;
use crate::lexer::{self, Token, TokenKind};

impl Document<'_> {
    /// Consecutive non-blank text lines. A blank line is consumed without a node.
    pub(crate) fn parse_paragraph(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let t = self.token(i)?;
        if t.is_blank() {
            return Ok((1, None));
        }
        let base = self.base_level;
        let mut lines = vec![trim_indent_up_to(&t.source, base).to_string()];
        let mut j = i + 1;
        while !parent_stop(&self.tokens, j) {
            let Some(t) = self.tokens.get(j) else { break };
            if t.kind != TokenKind::Text || t.is_blank() {
                break;
            }
            let indent = t.level.saturating_sub(base);
            lines.push(format!("{}{}", " ".repeat(indent), t.content));
            j += 1;
        }
        let children = self.parse_inline(&lines.join("\n"));
        Ok((j - i, Some(Node::Paragraph(Paragraph { children }))))
    }

    /// Consecutive `: text` lines.
    pub(crate) fn parse_example(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let start = i;
        let mut lines = Vec::new();
        let mut i = i;
        while !parent_stop(&self.tokens, i) {
            match self.tokens.get(i) {
                Some(t) if t.kind == TokenKind::Example => lines.push(t.content.clone()),
                _ => break,
            }
            i += 1;
        }
        Ok((i - start, Some(Node::Example(Example { lines }))))
    }

    /// `[fn:name] text` up to the next blank line, headline or definition.
    pub(crate) fn parse_footnote_definition(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let t = self.token(i)?;
        let name = t.capture(1).to_string();
        let text = t.content.clone();
        self.tokens[i] = lexer::plain_text(&text)?;

        let start = i;
        let stop = |t: &[Token], j: usize| {
            parent_stop(t, j)
                || t.get(j).is_some_and(|t| {
                    j > start && t.is_blank()
                        || matches!(t.kind, TokenKind::Headline | TokenKind::FootnoteDefinition)
                })
        };
        let (consumed, children) = self.parse_many(i, &stop)?;
        Ok((
            consumed.max(1),
            Some(Node::FootnoteDefinition(FootnoteDefinition { name, children })),
        ))
    }
}
