//! Recursive-descent parser over the token stream.
//!
//! Every construct parser has the same shape: it starts at token `i`, respects a stop
//! predicate inherited from its caller and returns how many tokens it consumed together
//! with the node it built. Consuming zero tokens means "not my construct after all"; the
//! driver then demotes the token to plain text and tries again, so parsing always
//! makes progress.
//!
//! Stop predicates look at the token slice rather than the document, which lets a parser
//! hold a predicate while mutating the document it is building.

mod agenda;
mod block;
mod drawer;
mod headline;
pub(crate) mod inline;
mod keyword;
mod list;
mod paragraph;
mod table;

use crate::core::Node;
use crate::document::Document;
use crate::error::OrgError;
use crate::lexer::{self, Token, TokenKind};

/// Termination condition for a run of nodes, evaluated before each token.
pub(crate) type Stop<'s> = dyn Fn(&[Token], usize) -> bool + 's;

/// `(consumed, node)`; a blank line consumes one token without producing a node.
pub(crate) type PResult = Result<(usize, Option<Node>), OrgError>;

/// Top-level stop: the end of the token stream.
pub(crate) fn at_end(tokens: &[Token], i: usize) -> bool {
    i >= tokens.len()
}

/// True when `i` and the token before it are both blank lines.
pub(crate) fn is_second_blank_line(tokens: &[Token], i: usize) -> bool {
    if i < 2 {
        return false;
    }
    matches!(
        (tokens.get(i - 1), tokens.get(i)),
        (Some(a), Some(b)) if a.is_blank() && b.is_blank()
    )
}

/// Remove at most `max` leading whitespace characters.
pub(crate) fn trim_indent_up_to(line: &str, max: usize) -> &str {
    let skip = line
        .char_indices()
        .take(max)
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map_or(0, |(idx, c)| idx + c.len_utf8());
    &line[skip..]
}

impl Document<'_> {
    pub(crate) fn token(&self, i: usize) -> Result<&Token, OrgError> {
        self.tokens
            .get(i)
            .ok_or_else(|| OrgError::Parse(format!("token index {i} out of range")))
    }

    /// Dispatch token `i` to the parser for its kind.
    pub(crate) fn parse_one(&mut self, i: usize, stop: &Stop<'_>) -> PResult {
        let kind = self.token(i)?.kind;
        let (consumed, node) = match kind {
            TokenKind::UnorderedList | TokenKind::OrderedList => self.parse_list(i, stop)?,
            TokenKind::TableRow | TokenKind::TableSeparator => self.parse_table(i, stop)?,
            TokenKind::BeginBlock => self.parse_block(i, stop)?,
            TokenKind::Result => self.parse_result(i, stop)?,
            TokenKind::BeginDrawer => self.parse_drawer(i, stop)?,
            TokenKind::Text => self.parse_paragraph(i, stop)?,
            TokenKind::Example => self.parse_example(i, stop)?,
            TokenKind::HorizontalRule => (1, Some(Node::HorizontalRule)),
            TokenKind::Comment => self.parse_comment(i)?,
            TokenKind::Keyword => self.parse_keyword(i, stop)?,
            TokenKind::Headline => self.parse_headline(i, stop)?,
            TokenKind::FootnoteDefinition => self.parse_footnote_definition(i, stop)?,
            TokenKind::Agenda => self.parse_agenda(i)?,
            // closing lines without an opener are never valid on their own
            TokenKind::EndDrawer | TokenKind::EndBlock => (0, None),
        };
        if consumed > 0 {
            return Ok((consumed, node));
        }
        if kind == TokenKind::Text {
            return Err(OrgError::Parse(format!(
                "plain text at line {} was not consumed",
                i + 1
            )));
        }

        let source = self.token(i)?.source.clone();
        tracing::warn!(
            path = %self.path.display(),
            line = i + 1,
            ?kind,
            "could not parse token, falling back to plain text"
        );
        self.tokens[i] = lexer::plain_text(&source)?;
        self.parse_one(i, stop)
    }

    /// Parse nodes from `i` until `stop` fires or the tokens run out.
    pub(crate) fn parse_many(
        &mut self,
        i: usize,
        stop: &Stop<'_>,
    ) -> Result<(usize, Vec<Node>), OrgError> {
        let mut j = i;
        let mut nodes = Vec::new();
        while j < self.tokens.len() && !stop(&self.tokens, j) {
            let (consumed, node) = self.parse_one(j, stop)?;
            j += consumed;
            nodes.extend(node);
        }
        Ok((j - i, nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::core::{Inline, Paragraph};

    #[test]
    fn trims_only_leading_whitespace_up_to_limit() {
        assert_eq!(trim_indent_up_to("    x", 2), "  x");
        assert_eq!(trim_indent_up_to("  x", 4), "x");
        assert_eq!(trim_indent_up_to("x  ", 4), "x  ");
        assert_eq!(trim_indent_up_to("", 3), "");
    }

    #[test]
    fn second_blank_line() {
        let tokens: Vec<Token> = ["a", "", "", "b"]
            .into_iter()
            .map(|l| lexer::tokenize(l).expect("lex"))
            .collect();
        assert!(!is_second_blank_line(&tokens, 1));
        assert!(is_second_blank_line(&tokens, 2));
        assert!(!is_second_blank_line(&tokens, 3));
        assert!(!is_second_blank_line(&tokens, 9));
    }

    #[test]
    fn unmatched_closers_fall_back_to_text() {
        let config = Configuration::new();
        let doc = config.parse("#+END_SRC\n:END:", "./");
        assert!(doc.error.is_none());
        let paragraph = |text: &str| {
            Node::Paragraph(Paragraph {
                children: vec![Inline::Text(text.into())],
            })
        };
        assert_eq!(
            doc.nodes,
            Some(vec![paragraph("#+END_SRC"), paragraph(":END:")])
        );
    }

    #[test]
    fn every_line_makes_progress() {
        let config = Configuration::new();
        let input = "#+BEGIN_QUOTE\nSCHEDULED: <2024-13-45>\n#+NAME: orphan\n:DRAWER:\n[fn:x]";
        let doc = config.parse(input, "./");
        assert!(doc.error.is_none(), "{:?}", doc.error);
        assert!(doc.nodes.is_some_and(|nodes| !nodes.is_empty()));
    }
}
