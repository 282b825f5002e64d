//! Turns an event page into typed columns.
//!
//! Pages follow three fixed templates. Each template gets its own line
//! scanner in a submodule; this module decides which one applies and holds
//! the field helpers they share.

use anyhow::Context;
use chrono::NaiveDateTime;
use compact_str::CompactString;

use crate::{
    event::{Columns, EventKind, Record, Table},
    expand::expand,
    util::{after, leading_int, parse_timestamp, strip_markup},
};

pub mod hijack;
pub mod leak;
pub mod outage;

/// Everything extracted from one page.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub kind: EventKind,
    pub columns: Columns,
    /// `leaker` sub-records of a leak, as parallel `asn`/`as_name` lists.
    pub leaked_to: Option<Columns>,
}

impl Extraction {
    pub const fn unknown() -> Self {
        Self {
            kind: EventKind::Unknown,
            columns: Columns::new(),
            leaked_to: None,
        }
    }

    /// Column maps per target table, parent row first.
    pub fn queries(&self) -> impl Iterator<Item = (Table, &Columns)> {
        let main = self.kind.table().map(|table| (table, &self.columns));
        let leaker = self.leaked_to.as_ref().map(|c| (Table::Leaker, c));
        main.into_iter().chain(leaker)
    }

    /// Fully scalar rows, ready for insertion. Empty for unclassified pages.
    pub fn records(&self) -> Vec<Record> {
        self.queries()
            .flat_map(|(table, columns)| {
                expand(columns).map(move |columns| Record { table, columns })
            })
            .collect()
    }
}

const STRUCTURAL_LABEL: &str = "Event type:";

fn kind_from_word(word: &str) -> Option<EventKind> {
    let word = word.to_ascii_lowercase();
    if word.contains("leak") {
        Some(EventKind::Leak)
    } else if word.contains("hijack") {
        Some(EventKind::Hijack)
    } else if word.contains("outage") {
        Some(EventKind::Outage)
    } else {
        None
    }
}

fn structural_kind(page: &str) -> Option<EventKind> {
    let rest = after(page, STRUCTURAL_LABEL)?;
    rest.lines()
        .map(|line| strip_markup(line).trim().to_owned())
        .find(|line| !line.is_empty())
        .and_then(|line| kind_from_word(&line))
}

/// Decides the single kind of a page.
///
/// An explicit `Event type:` field wins. Otherwise the literal markers are
/// tried in the order `Leak`, `hijack`, `outage`.
pub fn classify(page: &str) -> EventKind {
    if let Some(kind) = structural_kind(page) {
        return kind;
    }

    let markers = [
        ("Leak", EventKind::Leak),
        ("hijack", EventKind::Hijack),
        ("outage", EventKind::Outage),
    ];
    let mut found = markers.iter().filter(|(m, _)| page.contains(m));
    let Some(&(_, kind)) = found.next() else {
        return EventKind::Unknown;
    };
    let others = found.map(|(m, _)| *m).collect::<Vec<_>>();
    if !others.is_empty() {
        tracing::debug!(target: "extract", "page also mentions {others:?}, classified as {kind}");
    }
    kind
}

/// Classifies `page` and runs the matching scanner.
pub fn extract(id: i64, page: &str) -> anyhow::Result<Extraction> {
    let kind = classify(page);
    let (columns, leaked_to) = match kind {
        EventKind::Outage => (outage::parse(id, page)?, None),
        EventKind::Hijack => (hijack::parse(id, page)?, None),
        EventKind::Leak => leak::parse(id, page)?,
        EventKind::Unknown => return Ok(Extraction::unknown()),
    };
    Ok(Extraction {
        kind,
        columns,
        leaked_to,
    })
}

/// Text of a captured field with markup removed.
fn text(raw: &str) -> CompactString {
    strip_markup(raw).trim().into()
}

/// First integer in `raw`, skipping a leading `:` and whitespace.
fn int(raw: &str, what: &str) -> anyhow::Result<i64> {
    let cleaned = strip_markup(raw);
    let cleaned = cleaned.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    leading_int(cleaned).with_context(|| format!("{what}: no integer in {raw:?}"))
}

/// `<date> <time>` at the start of `raw`.
fn timestamp(raw: &str, what: &str) -> anyhow::Result<NaiveDateTime> {
    let cleaned = strip_markup(raw);
    let mut tokens = cleaned.split_whitespace();
    let (Some(date), Some(time)) = (tokens.next(), tokens.next()) else {
        anyhow::bail!("{what}: expected date and time in {raw:?}");
    };
    parse_timestamp(date, time).with_context(|| format!("{what}: bad timestamp {date} {time}"))
}

/// The part after the first `:` of `raw`.
fn colon_value<'a>(raw: &'a str, what: &str) -> anyhow::Result<&'a str> {
    after(raw, ":").with_context(|| format!("{what}: missing ':' in {raw:?}"))
}
