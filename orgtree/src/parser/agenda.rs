//! CLOSED / DEADLINE / SCHEDULED planning lines.

use super::PResult;
use crate::core::{Agenda, Node, Timestamp};
use crate::document::Document;
use chrono::{NaiveDate, NaiveTime};
use nom::{
    IResult,
    bytes::complete::take_while,
    character::complete::char,
    combinator::{all_consuming, map_res},
    error::{VerboseError, VerboseErrorKind},
    sequence::tuple,
};

type NResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Fields the lexer captures per marker: name, date, day, time, repeater.
const FIELDS: usize = 5;

impl Document<'_> {
    /// All markers on the line must parse, otherwise the line is declined.
    pub(crate) fn parse_agenda(&mut self, i: usize) -> PResult {
        let t = self.token(i)?;
        let mut agenda = Agenda::default();
        for n in 0..t.level {
            let field = |k: usize| t.capture(n * FIELDS + k);
            let Some(timestamp) = parse_timestamp(field(1), field(3), field(4)) else {
                tracing::debug!(line = i + 1, marker = field(0), "invalid planning timestamp");
                return Ok((0, None));
            };
            agenda.logs.insert(field(0).to_uppercase(), timestamp);
        }
        Ok((1, Some(Node::Agenda(agenda))))
    }
}

/// Build a timestamp from the captured date, optional ` HH:MM` and optional repeater.
pub(crate) fn parse_timestamp(date: &str, time: &str, repeater: &str) -> Option<Timestamp> {
    let (_, date) = all_consuming(parse_date)(date).ok()?;
    let time = time.trim();
    let (value, is_date) = if time.is_empty() {
        (date.and_hms_opt(0, 0, 0)?, true)
    } else {
        let (_, time) = all_consuming(parse_time)(time).ok()?;
        (date.and_time(time), false)
    };
    Some(Timestamp {
        value,
        is_date,
        interval: repeater.trim().to_string(),
    })
}

fn parse_date(i: &str) -> NResult<'_, NaiveDate> {
    map_res(
        tuple((
            map_res(take_while_m_n(4, 4, char_is_digit), |s: &str| {
                s.parse::<i32>()
            }),
            char('-'),
            map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                s.parse::<u32>()
            }),
            char('-'),
            map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                s.parse::<u32>()
            }),
        )),
        |(y, _, m, _, d)| NaiveDate::from_ymd_opt(y, m, d).ok_or("invalid date"),
    )(i)
}

fn parse_time(i: &str) -> NResult<'_, NaiveTime> {
    map_res(
        tuple((
            map_res(take_while_m_n(1, 2, char_is_digit), |s: &str| {
                s.parse::<u32>()
            }),
            char(':'),
            map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                s.parse::<u32>()
            }),
        )),
        |(h, _, m)| NaiveTime::from_hms_opt(h, m, 0).ok_or("invalid time"),
    )(i)
}

fn take_while_m_n<F>(m: usize, n: usize, cond: F) -> impl Fn(&str) -> NResult<'_, &str>
where
    F: Fn(char) -> bool + Copy,
{
    move |i: &str| {
        let (i, out) = take_while(cond)(i)?;
        if out.len() < m || out.len() > n {
            Err(nom::Err::Error(VerboseError {
                errors: vec![(i, VerboseErrorKind::Context("m_n"))],
            }))
        } else {
            Ok((i, out))
        }
    }
}

fn char_is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use chrono::NaiveDateTime;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").expect("datetime")
    }

    #[test]
    fn closed_with_time_and_date_only_deadline() {
        let config = Configuration::new();
        let doc = config.parse("CLOSED: [2024-01-02 Tue 10:00] DEADLINE: <2024-01-05>", "./");
        let Some([Node::Agenda(agenda)]) = doc.nodes.as_deref() else {
            panic!("expected one agenda node, got {:?}", doc.nodes);
        };
        let closed = agenda.get("CLOSED").expect("closed");
        assert!(!closed.is_date);
        assert_eq!(closed.value, at("2024-01-02 10:00"));
        let deadline = agenda.get("deadline").expect("deadline");
        assert!(deadline.is_date);
        assert_eq!(deadline.date(), NaiveDate::from_ymd_opt(2024, 1, 5).expect("date"));
        assert_eq!(agenda.logs.len(), 2);
    }

    #[test]
    fn repeater_is_kept_trimmed() {
        let ts = parse_timestamp("2024-03-01", " 9:30", " +1w").expect("timestamp");
        assert_eq!(ts.value, at("2024-03-01 09:30"));
        assert_eq!(ts.interval, "+1w");
    }

    #[test]
    fn one_bad_marker_rejects_the_whole_line() {
        let config = Configuration::new();
        let doc = config.parse("SCHEDULED: <2024-01-02> DEADLINE: <2024-02-31>", "./");
        let nodes = doc.nodes.expect("nodes");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind_name(), "paragraph");
    }

    #[test]
    fn invalid_times_are_rejected() {
        assert!(parse_timestamp("2024-01-02", " 25:00", "").is_none());
        assert!(parse_timestamp("24-01-02", "", "").is_none());
    }
}
