use std::{borrow::Cow, sync::LazyLock};

use chrono::NaiveDateTime;
use regex::Regex;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").unwrap());

/// Removes everything that looks like a tag, leaving the surrounding text untouched.
pub fn strip_markup(raw: &str) -> Cow<'_, str> {
    MARKUP.replace_all(raw, "")
}

/// The text following the first occurrence of `label`.
pub fn after<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.find(label).map(|i| &line[i + label.len()..])
}

/// The text between the first `open` and the next `close` after it.
pub fn between<'a>(text: &'a str, open: char, close: char) -> Option<&'a str> {
    let (_, rest) = text.split_once(open)?;
    rest.split_once(close).map(|(inner, _)| inner)
}

/// Parses a leading run of ASCII digits, ignoring surrounding whitespace and markup.
pub fn leading_int(text: &str) -> Option<i64> {
    let text = strip_markup(text);
    let text = text.trim_start();
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// Layout of every timestamp on event pages. Times are UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `YYYY-MM-DD` + `HH:MM:SS` (UTC) as found on event pages.
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_tags() {
        assert_eq!(strip_markup("<b>AS1234</b>"), "AS1234");
        assert_eq!(strip_markup("<a href=\"/x\">Foo</a> Bar<br/>"), "Foo Bar");
        assert_eq!(strip_markup("no tags"), "no tags");
    }

    #[test]
    fn slices_around_labels() {
        assert_eq!(after("Start time: 2020", "Start time:"), Some(" 2020"));
        assert_eq!(after("nothing", "Start time:"), None);
        assert_eq!(between("x (AS1 Foo) (y)", '(', ')'), Some("AS1 Foo"));
        assert_eq!(between("x (unterminated", '(', ')'), None);
        assert_eq!(leading_int(" <b>42</b> (3%)"), Some(42));
        assert_eq!(leading_int("abc"), None);
    }

    #[test]
    fn timestamps_are_utc() {
        let t = parse_timestamp("1970-01-02", "00:00:01").unwrap();
        assert_eq!(t.and_utc().timestamp(), 86401);

        let t = parse_timestamp("2019-03-28", "17:45:00").unwrap();
        assert_eq!(t.and_utc().timestamp(), 1_553_795_100);
        assert_eq!(t.format(TIMESTAMP_FORMAT).to_string(), "2019-03-28 17:45:00");

        assert!(parse_timestamp("2019-13-01", "00:00:00").is_none());
        assert!(parse_timestamp("2019-02-30", "00:00:00").is_none());
        assert!(parse_timestamp("2019-01-01", "noon").is_none());
    }

    #[test]
    fn absurd_years_are_rejected() {
        assert!(parse_timestamp("9223372036854775807-01-01", "00:00:00").is_none());
        assert!(parse_timestamp("99999999999999-01-01", "00:00:00").is_none());
        assert!(parse_timestamp("-99999999999999-01-01", "00:00:00").is_none());
    }
}
