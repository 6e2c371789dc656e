use super::{PResult, Stop};
use crate::core::{Node, Row, Table};
use crate::document::Document;
use crate::lexer::TokenKind;

impl Document<'_> {
    pub(crate) fn parse_table(&mut self, i: usize, parent_stop: &Stop<'_>) -> PResult {
        let start = i;
        let mut raw_rows: Vec<Option<Vec<String>>> = Vec::new();
        let mut i = i;
        while !parent_stop(&self.tokens, i) {
            let Some(t) = self.tokens.get(i) else { break };
            match t.kind {
                TokenKind::TableRow => raw_rows.push(Some(split_row(&t.content))),
                TokenKind::TableSeparator => raw_rows.push(None),
                _ => break,
            }
            i += 1;
        }

        let mut rows = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let row = match raw {
                Some(cells) => Row {
                    cells: cells.iter().map(|c| self.parse_inline(c)).collect(),
                    is_separator: false,
                },
                None => Row {
                    cells: vec![],
                    is_separator: true,
                },
            };
            rows.push(row);
        }
        Ok((i - start, Some(Node::Table(Table { rows }))))
    }
}

/// `| a | b |` → `["a", "b"]`; the closing bar is optional.
fn split_row(content: &str) -> Vec<String> {
    let inner = content.strip_prefix('|').unwrap_or(content);
    let inner = inner.trim_end();
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}
