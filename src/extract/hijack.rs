use super::{colon_value, int, text, timestamp};
use crate::{
    event::Columns,
    util::{after, between},
};

const START: &str = "Start time:";
const EXPECTED_PREFIX: &str = "Expected prefix:";
const EXPECTED_ASN: &str = "Expected ASN:";
const BEGINNING: &str = "But beginning at";
const ADVERTISEMENT: &str = "Detected advertisement:";
const ORIGIN_ASN: &str = "Detected Origin ASN";
const AS_PATH: &str = "Detected AS Path";
const PEERS: &str = "Detected by number of BGPMon";

/// AS names follow their number in parentheses, sometimes on a later line.
/// The state records whose name is still outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Body,
    /// Waiting for `original_as_name`.
    ExpectedName,
    /// Waiting for `hj_as_name`.
    DetectedName,
}

impl State {
    const fn column(self) -> Option<&'static str> {
        match self {
            Self::Body => None,
            Self::ExpectedName => Some("original_as_name"),
            Self::DetectedName => Some("hj_as_name"),
        }
    }
}

#[derive(Debug)]
pub struct Scanner {
    state: State,
    columns: Columns,
}

impl Scanner {
    pub fn new(id: i64) -> Self {
        let mut columns = Columns::new();
        columns.insert("id", id);
        Self {
            state: State::Body,
            columns,
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    pub fn line(&mut self, line: &str) -> anyhow::Result<()> {
        let tail = self.fields(line)?;
        let Some(column) = self.state.column() else {
            return Ok(());
        };
        if let Some(name) = between(tail, '(', ')') {
            self.columns.insert(column, text(name));
            self.state = State::Body;
        }
        Ok(())
    }

    /// Reads labelled values and returns the part of `line` that may still hold a pending AS name.
    fn fields<'a>(&mut self, line: &'a str) -> anyhow::Result<&'a str> {
        let columns = &mut self.columns;
        let mut tail = line;
        if let Some(rest) = after(line, START) {
            columns.insert("start_time", timestamp(rest, START)?);
        }
        if let Some(rest) = after(line, EXPECTED_PREFIX) {
            columns.insert("original_prefix", text(rest));
        }
        if let Some(rest) = after(line, EXPECTED_ASN) {
            columns.insert("original_asn", int(rest, EXPECTED_ASN)?);
            self.state = State::ExpectedName;
            tail = rest;
        }
        if let Some(rest) = after(line, BEGINNING) {
            columns.insert("hj_time", timestamp(rest, BEGINNING)?);
        }
        if let Some(rest) = after(line, ADVERTISEMENT) {
            columns.insert("hj_prefix", text(rest));
        }
        if let Some(rest) = after(line, ORIGIN_ASN) {
            columns.insert("hj_asn", int(rest, ORIGIN_ASN)?);
            self.state = State::DetectedName;
            tail = rest;
        }
        if let Some(rest) = after(line, AS_PATH) {
            columns.insert("hj_as_path", text(rest.trim_start_matches(':')));
        }
        if let Some(rest) = after(line, PEERS) {
            columns.insert("number_of_peers", int(colon_value(rest, PEERS)?, PEERS)?);
        }
        Ok(tail)
    }

    pub fn finish(self) -> Columns {
        if let Some(column) = self.state.column() {
            tracing::debug!(target: "extract", "{column} never found");
        }
        self.columns
    }
}

pub fn parse(id: i64, page: &str) -> anyhow::Result<Columns> {
    let mut scanner = Scanner::new(id);
    for line in page.lines() {
        scanner.line(line)?;
    }
    Ok(scanner.finish())
}
