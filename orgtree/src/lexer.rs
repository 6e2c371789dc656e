//! Line classifier.
//!
//! Every raw line is mapped to exactly one [`Token`] by trying the recognizers in
//! [`LEX_FNS`] in order; the first match wins and [`lex_text`] is the catch-all.

use crate::error::OrgError;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Headline,
    BeginDrawer,
    EndDrawer,
    BeginBlock,
    EndBlock,
    Result,
    UnorderedList,
    OrderedList,
    TableRow,
    TableSeparator,
    HorizontalRule,
    Agenda,
    Keyword,
    Comment,
    FootnoteDefinition,
    Example,
    Text,
}

/// One classified line.
///
/// `level` depends on the kind: leading indent for most tokens, a `0` placeholder for
/// headlines (the star run lives in `captures[1]`) and the number of markers for agenda
/// lines. `captures` holds the regex groups of the winning rule, except for agenda lines
/// where it is flattened to five fields per marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub level: usize,
    pub content: String,
    pub captures: Vec<String>,
    /// The raw line, used when the token is demoted to plain text.
    pub source: String,
}

impl Token {
    fn new(kind: TokenKind, level: usize, content: &str, captures: Vec<String>, source: &str) -> Self {
        Self {
            kind,
            level,
            content: content.to_string(),
            captures,
            source: source.to_string(),
        }
    }

    /// Capture group `idx`, or `""` when the group did not participate.
    pub fn capture(&self, idx: usize) -> &str {
        self.captures.get(idx).map_or("", String::as_str)
    }

    pub fn is_blank(&self) -> bool {
        self.kind == TokenKind::Text && self.content.is_empty()
    }

    /// Star count of a headline token.
    pub fn headline_level(&self) -> Option<usize> {
        (self.kind == TokenKind::Headline).then(|| self.capture(1).len())
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, TokenKind::UnorderedList | TokenKind::OrderedList)
    }
}

type LexFn = fn(&str) -> Option<Token>;

const LEX_FNS: &[LexFn] = &[
    lex_headline,
    lex_drawer,
    lex_block,
    lex_result,
    lex_list,
    lex_table,
    lex_horizontal_rule,
    lex_agenda,
    lex_keyword_or_comment,
    lex_footnote_definition,
    lex_example,
    lex_text,
];

/// Classify one line. Failing here means the catch-all rule is broken.
pub fn tokenize(line: &str) -> Result<Token, OrgError> {
    LEX_FNS
        .iter()
        .find_map(|lex| lex(line))
        .ok_or_else(|| OrgError::Lex(line.to_string()))
}

/// Classify `line` as plain text regardless of what it looks like.
pub fn plain_text(line: &str) -> Result<Token, OrgError> {
    lex_text(line).ok_or_else(|| OrgError::Lex(line.to_string()))
}

/* ------------------------------- Patterns ------------------------------- */

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

pattern!(HEADLINE, r"^([*]+)\s+(.*)");
pattern!(BEGIN_DRAWER, r"^(\s*):(\S+):\s*$");
pattern!(END_DRAWER, r"(?i)^(\s*):END:\s*$");
pattern!(BEGIN_BLOCK, r"(?i)^(\s*)#\+BEGIN_(\w+)(.*)");
pattern!(END_BLOCK, r"(?i)^(\s*)#\+END_(\w+)");
pattern!(RESULT, r"(?i)^(\s*)#\+RESULTS:\s*(.*)");
pattern!(UNORDERED_LIST, r"^(\s*)([+*-])(\s+(.*)|$)");
pattern!(ORDERED_LIST, r"^(\s*)(([0-9]+|[a-zA-Z])[.)])(\s+(.*)|$)");
pattern!(TABLE_SEPARATOR, r"^(\s*)(\|[+|-]*)\s*$");
pattern!(TABLE_ROW, r"^(\s*)(\|.*)");
pattern!(HORIZONTAL_RULE, r"^(\s*)-{5,}\s*$");
pattern!(
    AGENDA,
    r"(CLOSED|DEADLINE|SCHEDULED):\s(?:\[|<)(\d{4}-\d{2}-\d{2})( [A-Za-z]+)?( \d{2}:\d{2})?( \+\d+[dwmy])?(?:\]|>)"
);
pattern!(KEYWORD, r"^(\s*)#\+([^:]+):(\s+(.*)|$)");
pattern!(COMMENT, r"^(\s*)#\s(.*)");
pattern!(FOOTNOTE_DEFINITION, r"^\[fn:([\w-]+)\](\s+(.+)|\s*$)");
pattern!(EXAMPLE, r"^(\s*):(\s(.*)|\s*$)");
pattern!(PLAIN_TEXT, r"^(\s*)(.*)");

fn captures_of(caps: &Captures<'_>) -> Vec<String> {
    caps.iter()
        .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
        .collect()
}

fn group<'a>(caps: &Captures<'a>, idx: usize) -> &'a str {
    caps.get(idx).map_or("", |m| m.as_str())
}

/// Builds a token whose level is the indent in group 1.
fn indented(kind: TokenKind, caps: &Captures<'_>, content: &str, line: &str) -> Token {
    Token::new(kind, group(caps, 1).len(), content, captures_of(caps), line)
}

/* ------------------------------ Recognizers ------------------------------ */

fn lex_headline(line: &str) -> Option<Token> {
    let caps = HEADLINE.captures(line)?;
    Some(Token::new(
        TokenKind::Headline,
        0,
        group(&caps, 2),
        captures_of(&caps),
        line,
    ))
}

fn lex_drawer(line: &str) -> Option<Token> {
    if let Some(caps) = END_DRAWER.captures(line) {
        return Some(indented(TokenKind::EndDrawer, &caps, "", line));
    }
    let caps = BEGIN_DRAWER.captures(line)?;
    Some(indented(TokenKind::BeginDrawer, &caps, group(&caps, 2), line))
}

fn lex_block(line: &str) -> Option<Token> {
    if let Some(caps) = BEGIN_BLOCK.captures(line) {
        let name = group(&caps, 2).to_uppercase();
        return Some(indented(TokenKind::BeginBlock, &caps, &name, line));
    }
    let caps = END_BLOCK.captures(line)?;
    let name = group(&caps, 2).to_uppercase();
    Some(indented(TokenKind::EndBlock, &caps, &name, line))
}

fn lex_result(line: &str) -> Option<Token> {
    let caps = RESULT.captures(line)?;
    Some(indented(TokenKind::Result, &caps, group(&caps, 2), line))
}

fn lex_list(line: &str) -> Option<Token> {
    if let Some(caps) = UNORDERED_LIST.captures(line) {
        return Some(indented(TokenKind::UnorderedList, &caps, group(&caps, 4), line));
    }
    let caps = ORDERED_LIST.captures(line)?;
    Some(indented(TokenKind::OrderedList, &caps, group(&caps, 5), line))
}

fn lex_table(line: &str) -> Option<Token> {
    if let Some(caps) = TABLE_SEPARATOR.captures(line) {
        return Some(indented(TokenKind::TableSeparator, &caps, group(&caps, 2), line));
    }
    let caps = TABLE_ROW.captures(line)?;
    Some(indented(TokenKind::TableRow, &caps, group(&caps, 2), line))
}

fn lex_horizontal_rule(line: &str) -> Option<Token> {
    let caps = HORIZONTAL_RULE.captures(line)?;
    Some(indented(TokenKind::HorizontalRule, &caps, "", line))
}

fn lex_agenda(line: &str) -> Option<Token> {
    let mut flattened = Vec::new();
    let mut found = 0;
    for caps in AGENDA.captures_iter(line).take(3) {
        found += 1;
        flattened.extend((1..=5).map(|idx| group(&caps, idx).to_string()));
    }
    (found > 0).then(|| Token::new(TokenKind::Agenda, found, "", flattened, line))
}

fn lex_keyword_or_comment(line: &str) -> Option<Token> {
    if let Some(caps) = KEYWORD.captures(line) {
        return Some(indented(TokenKind::Keyword, &caps, group(&caps, 2), line));
    }
    let caps = COMMENT.captures(line)?;
    Some(indented(TokenKind::Comment, &caps, group(&caps, 2), line))
}

fn lex_footnote_definition(line: &str) -> Option<Token> {
    let caps = FOOTNOTE_DEFINITION.captures(line)?;
    Some(Token::new(
        TokenKind::FootnoteDefinition,
        0,
        group(&caps, 3),
        captures_of(&caps),
        line,
    ))
}

fn lex_example(line: &str) -> Option<Token> {
    let caps = EXAMPLE.captures(line)?;
    Some(indented(TokenKind::Example, &caps, group(&caps, 3), line))
}

fn lex_text(line: &str) -> Option<Token> {
    let caps = PLAIN_TEXT.captures(line)?;
    Some(indented(TokenKind::Text, &caps, group(&caps, 2), line))
}
