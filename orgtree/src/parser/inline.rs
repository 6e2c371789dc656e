//! Inline markup inside paragraphs, titles, captions and table cells.
//!
//! Each construct is a small `nom` parser; anything that does not parse is kept as text
//! one character at a time and merged afterwards.

use crate::core::{Emphasis, Inline, RegularLink};
use crate::document::Document;
use indexmap::IndexMap;
use std::{cell::RefCell, collections::HashMap};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1, take_until, take_while1},
    character::complete::{anychar, char},
    error::{VerboseError, VerboseErrorKind},
    sequence::{delimited, preceded},
};

type NResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct InlineOptions {
    pub auto_link: bool,
    pub max_emphasis_new_lines: usize,
}

impl Document<'_> {
    /// Parse inline markup and record every `id:` link target for later resolution.
    pub(crate) fn parse_inline(&mut self, text: &str) -> Vec<Inline> {
        let options = InlineOptions {
            auto_link: self.config.auto_link,
            max_emphasis_new_lines: self.config.max_emphasis_new_lines,
        };
        let inlines = parse(text, options);
        collect_ids(&inlines, &mut self.id_links);
        inlines
    }
}

fn collect_ids(inlines: &[Inline], ids: &mut IndexMap<String, String>) {
    for inline in inlines {
        match inline {
            Inline::Link(link) => {
                if link.protocol == "id" {
                    let id = link.url.strip_prefix("id:").unwrap_or(&link.url);
                    ids.entry(id.to_string()).or_default();
                }
                if let Some(description) = &link.description {
                    collect_ids(description, ids);
                }
            }
            Inline::Emphasis { children, .. } => collect_ids(children, ids),
            _ => {}
        }
    }
}

pub(crate) fn parse(s: &str, options: InlineOptions) -> Vec<Inline> {
    Parser::new(options).parse_str(s)
}

/// Emphasis outcome at a position: remaining length and node, or `None` when unclosed.
type EmphasisMemo = HashMap<(usize, char), Option<(usize, Inline)>>;

/// Parses one string. Positions are tracked as remaining length, so a parser must not be
/// reused for a different input.
struct Parser {
    options: InlineOptions,
    /// Without it every unclosed opener is retried inside each enclosing attempt.
    emphasis: RefCell<EmphasisMemo>,
}

fn error<'a, T>(i: &'a str, context: &'static str) -> NResult<'a, T> {
    Err(nom::Err::Error(VerboseError {
        errors: vec![(i, VerboseErrorKind::Context(context))],
    }))
}

/// Markup may start at the beginning of the text, after whitespace or an opening
/// punctuation mark.
fn opens(prev: Option<char>) -> bool {
    prev.is_none_or(|c| c.is_whitespace() || matches!(c, '-' | '(' | '{' | '\'' | '"'))
}

/// A closing marker follows a non-blank character and is not glued to a word.
fn closes(prev: Option<char>, after: &str) -> bool {
    prev.is_some_and(|c| !c.is_whitespace())
        && after.chars().next().is_none_or(|c| !c.is_alphanumeric())
}

fn last_char(consumed: &str) -> Option<char> {
    consumed.chars().next_back()
}

impl Parser {
    fn new(options: InlineOptions) -> Self {
        Self {
            options,
            emphasis: RefCell::new(HashMap::new()),
        }
    }

    fn parse_str(&self, s: &str) -> Vec<Inline> {
        match self.parse_seq(s, None, None) {
            Ok((rest, mut v)) => {
                if !rest.is_empty() {
                    v.push(Inline::Text(rest.to_string()));
                    coalesce_text(&mut v);
                }
                v
            }
            Err(_) => vec![Inline::Text(s.to_string())],
        }
    }

    /// Inline nodes up to `stop` (a closing emphasis marker) or the end of input.
    fn parse_seq<'a>(
        &self,
        mut i: &'a str,
        stop: Option<char>,
        mut prev: Option<char>,
    ) -> NResult<'a, Vec<Inline>> {
        let mut out = Vec::new();
        loop {
            if i.is_empty() {
                if stop.is_some() {
                    return error(i, "unclosed-emphasis");
                }
                break;
            }
            if let Some(stop) = stop {
                if i.starts_with(stop) && closes(prev, &i[stop.len_utf8()..]) {
                    break;
                }
            }
            match self.inline_atom(i, prev) {
                Ok((r, node)) => {
                    prev = last_char(&i[..i.len() - r.len()]);
                    out.push(node);
                    i = r;
                }
                Err(_) => {
                    let (r, ch) = anychar(i)?;
                    out.push(Inline::Text(ch.to_string()));
                    prev = Some(ch);
                    i = r;
                }
            }
        }
        coalesce_text(&mut out);
        Ok((i, out))
    }

    fn inline_atom<'a>(&self, i: &'a str, prev: Option<char>) -> NResult<'a, Inline> {
        if let Ok(found) = self.parse_link_bracketed(i) {
            return Ok(found);
        }
        if let Ok(found) = alt((parse_target_inline, parse_footnote_ref))(i) {
            return Ok(found);
        }
        if let Ok(found) = self.parse_markup(i, prev) {
            return Ok(found);
        }
        if self.options.auto_link {
            if let Ok(found) = parse_autolink(i, prev) {
                return Ok(found);
            }
        }
        alt((parse_entity_inline, parse_text_chunk))(i)
    }

    fn parse_markup<'a>(&self, i: &'a str, prev: Option<char>) -> NResult<'a, Inline> {
        if !opens(prev) {
            return error(i, "markup-boundary");
        }
        match i.chars().next() {
            Some('~') => parse_code_like(i, '~', Inline::Code),
            Some('=') => parse_code_like(i, '=', Inline::Verbatim),
            Some('*') => self.parse_emph_with(i, '*', Emphasis::Bold),
            Some('/') => self.parse_emph_with(i, '/', Emphasis::Italic),
            Some('_') => self.parse_emph_with(i, '_', Emphasis::Underline),
            Some('+') => self.parse_emph_with(i, '+', Emphasis::Strike),
            _ => error(i, "markup"),
        }
    }

    fn parse_emph_with<'a>(&self, i: &'a str, delim: char, kind: Emphasis) -> NResult<'a, Inline> {
        let key = (i.len(), delim);
        let cached = self.emphasis.borrow().get(&key).cloned();
        let outcome = match cached {
            Some(outcome) => outcome,
            None => {
                let outcome = self
                    .parse_emph_uncached(i, delim, kind)
                    .ok()
                    .map(|(rest, node)| (rest.len(), node));
                self.emphasis.borrow_mut().insert(key, outcome.clone());
                outcome
            }
        };
        match outcome {
            Some((rest_len, node)) => Ok((&i[i.len() - rest_len..], node)),
            None => error(i, "emphasis"),
        }
    }

    fn parse_emph_uncached<'a>(&self, i: &'a str, delim: char, kind: Emphasis) -> NResult<'a, Inline> {
        let (body, _) = char(delim)(i)?;
        if body.starts_with(char::is_whitespace) || body.starts_with(delim) {
            return error(body, "emphasis-open");
        }
        let (rest, children) = self.parse_seq(body, Some(delim), Some(delim))?;
        let inner = &body[..body.len() - rest.len()];
        if inner.matches('\n').count() > self.options.max_emphasis_new_lines {
            return error(body, "emphasis-newlines");
        }
        let (rest, _) = char(delim)(rest)?;
        Ok((rest, Inline::Emphasis { kind, children }))
    }

    fn parse_link_bracketed<'a>(&self, i: &'a str) -> NResult<'a, Inline> {
        let (i, target) = preceded(tag("[["), take_till1(|c: char| c == ']'))(i)?;
        let described: NResult<'a, &'a str> =
            delimited(tag("]["), take_until("]]"), tag("]]"))(i);
        if let Ok((i, desc)) = described {
            let description = Some(Parser::new(self.options).parse_str(desc));
            return Ok((i, Inline::Link(regular_link(target, description, false))));
        }
        let (i, _) = tag("]]")(i)?;
        Ok((i, Inline::Link(regular_link(target, None, false))))
    }
}

fn regular_link(target: &str, description: Option<Vec<Inline>>, auto_link: bool) -> RegularLink {
    let url = target.trim();
    let protocol = url
        .split_once(':')
        .map(|(p, _)| p)
        .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or_default();
    RegularLink {
        protocol: protocol.to_string(),
        url: url.to_string(),
        description,
        auto_link,
    }
}

fn coalesce_text(xs: &mut Vec<Inline>) {
    let mut out = Vec::with_capacity(xs.len());
    for x in xs.drain(..) {
        if let (Some(Inline::Text(prev)), Inline::Text(s)) = (out.last_mut(), &x) {
            prev.push_str(s);
        } else {
            out.push(x);
        }
    }
    *xs = out;
}

fn parse_code_like(i: &str, delim: char, make: fn(String) -> Inline) -> NResult<'_, Inline> {
    let (i, _) = char(delim)(i)?;
    let (i, body) = take_till1(move |c: char| c == delim)(i)?;
    if body.starts_with(char::is_whitespace) || body.ends_with(char::is_whitespace) {
        return error(i, "code-padding");
    }
    let (rest, _) = char(delim)(i)?;
    if !closes(last_char(body), rest) {
        return error(rest, "code-close");
    }
    Ok((rest, make(body.to_string())))
}

fn parse_autolink(i: &str, prev: Option<char>) -> NResult<'_, Inline> {
    if prev.is_some_and(char::is_alphanumeric) {
        return error(i, "autolink-boundary");
    }
    let (rest, scheme) = alt((tag("https://"), tag("http://"), tag("mailto:")))(i)?;
    let (_, body) =
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, ')' | ']' | '>' | '<' | '"'))(
            rest,
        )?;
    // trailing punctuation belongs to the sentence
    let body = body.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\''));
    if body.is_empty() {
        return error(rest, "autolink-empty");
    }
    let len = scheme.len() + body.len();
    Ok((&i[len..], Inline::Link(regular_link(&i[..len], None, true))))
}

fn parse_target_inline(i: &str) -> NResult<'_, Inline> {
    let (i, _) = tag("<<")(i)?;
    let (i, name) = take_until(">>")(i)?;
    let (i, _) = tag(">>")(i)?;
    Ok((i, Inline::Target(name.to_string())))
}

fn parse_footnote_ref(i: &str) -> NResult<'_, Inline> {
    let (i, _) = tag("[fn:")(i)?;
    let (i, label) = take_till1(|c: char| c == ']')(i)?;
    let (i, _) = char(']')(i)?;
    Ok((i, Inline::FootnoteRef(label.to_string())))
}

fn parse_entity_inline(i: &str) -> NResult<'_, Inline> {
    let (i, _) = char('\\')(i)?;
    let (i, ident) = take_while1(|c: char| c.is_ascii_alphabetic())(i)?;
    Ok((i, Inline::Entity(format!("\\{}", ident))))
}

fn parse_text_chunk(i: &str) -> NResult<'_, Inline> {
    fn is_plain(c: char) -> bool {
        !matches!(
            c,
            '[' | '<' | '*' | '/' | '_' | '+' | '~' | '=' | '\\' | 'h' | 'm'
        )
    }
    let (i, s) = take_while1(is_plain)(i)?;
    Ok((i, Inline::Text(s.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use std::time::{Duration, Instant};

    fn parse_default(s: &str) -> Vec<Inline> {
        parse(
            s,
            InlineOptions {
                auto_link: true,
                max_emphasis_new_lines: 1,
            },
        )
    }

    fn text(s: &str) -> Inline {
        Inline::Text(s.into())
    }

    #[test]
    fn emphasis_and_code() {
        assert_eq!(
            parse_default("a *bold* and ~code~ here"),
            [
                text("a "),
                Inline::Emphasis {
                    kind: Emphasis::Bold,
                    children: vec![text("bold")]
                },
                text(" and "),
                Inline::Code("code".into()),
                text(" here"),
            ]
        );
    }

    #[test]
    fn markers_inside_words_are_text() {
        assert_eq!(parse_default("snake_case_name and a/b/c"), [text("snake_case_name and a/b/c")]);
        assert_eq!(parse_default("2 * 3 * 4"), [text("2 * 3 * 4")]);
    }

    #[test]
    fn nested_emphasis() {
        let parsed = parse_default("/it *bo*/");
        assert_eq!(
            parsed,
            [Inline::Emphasis {
                kind: Emphasis::Italic,
                children: vec![
                    text("it "),
                    Inline::Emphasis {
                        kind: Emphasis::Bold,
                        children: vec![text("bo")]
                    }
                ]
            }]
        );
    }

    #[test]
    fn emphasis_newline_limit() {
        assert!(matches!(parse_default("*a\nb*")[0], Inline::Emphasis { .. }));
        assert_eq!(parse_default("*a\nb\nc*"), [text("*a\nb\nc*")]);
    }

    #[test]
    fn unclosed_openers_do_not_backtrack() {
        let started = Instant::now();
        let input = format!("x {}", "*a ".repeat(40));
        assert_eq!(parse_default(&input), [text(&input)]);

        // only the last opener has a closer
        let input = format!("{}b* /c _d ", "*a ".repeat(40));
        let parsed = parse_default(&input);
        assert!(parsed.iter().any(|x| matches!(x, Inline::Emphasis { kind: Emphasis::Bold, .. })));
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    }

    #[test]
    fn links() {
        let parsed = parse_default("see [[https://x.org][the *site*]] or [[file:a.org]]");
        let Inline::Link(first) = &parsed[1] else {
            panic!("expected link, got {parsed:?}");
        };
        assert_eq!(first.protocol, "https");
        assert_eq!(first.url, "https://x.org");
        assert_eq!(first.description.as_ref().map(Vec::len), Some(2));
        let Inline::Link(second) = &parsed[3] else {
            panic!("expected link, got {parsed:?}");
        };
        assert_eq!(second.protocol, "file");
        assert!(second.description.is_none());
    }

    #[test]
    fn auto_links_respect_configuration() {
        let parsed = parse_default("go to https://example.com/a.");
        assert_eq!(parsed.len(), 3);
        let Inline::Link(link) = &parsed[1] else {
            panic!("expected link");
        };
        assert!(link.auto_link);
        assert_eq!(link.url, "https://example.com/a");
        assert_eq!(parsed[2], text("."));

        let off = parse(
            "https://example.com",
            InlineOptions {
                auto_link: false,
                max_emphasis_new_lines: 1,
            },
        );
        assert_eq!(off, [text("https://example.com")]);
    }

    #[test]
    fn targets_footnotes_entities() {
        assert_eq!(
            parse_default("<<here>> [fn:1] \\alpha"),
            [
                Inline::Target("here".into()),
                text(" "),
                Inline::FootnoteRef("1".into()),
                text(" "),
                Inline::Entity("\\alpha".into()),
            ]
        );
    }

    #[test]
    fn id_links_are_collected() {
        let config = Configuration::new().with_id_store(crate::store::JsonIdStore::default());
        let doc = config.parse("* Title [[id:one][One]]\n*[[id:two]]* text", "./");
        let ids: Vec<_> = doc.id_links.keys().map(String::as_str).collect();
        assert_eq!(ids, ["one", "two"]);
    }
}
