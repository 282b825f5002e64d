use anyhow::Context;

use super::{colon_value, int, text, timestamp};
use crate::{
    event::{Columns, Value},
    util::{after, between, strip_markup},
};

const START: &str = "Start time:";
const PREFIX: &str = "Leaked prefix:";
const LEAKED_BY: &str = "Leaked by";
const AS_PATH: &str = "Example AS path:";
const PEERS: &str = "Number of BGPMon peers";
const LEAKED_TO: &str = "Leaked To:";
const ITEM: &str = "<li>";
const CELL_END: &str = "</td>";

/// Position of the scanner relative to the "Leaked To" list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Plain `label: value` lines.
    Body,
    /// Inside the recipient list; every `<li>` is one recipient.
    LeakedTo,
    /// The list has been closed by its table cell; it is not reopened.
    Closed,
}

#[derive(Debug)]
pub struct Scanner {
    id: i64,
    state: State,
    columns: Columns,
    leaked_to: Option<Columns>,
}

impl Scanner {
    pub fn new(id: i64) -> Self {
        let mut columns = Columns::new();
        columns.insert("id", id);
        Self {
            id,
            state: State::Body,
            columns,
            leaked_to: None,
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    pub fn line(&mut self, line: &str) -> anyhow::Result<()> {
        match self.state {
            State::Body => {
                self.fields(line)?;
                if let Some(rest) = after(line, LEAKED_TO) {
                    self.state = State::LeakedTo;
                    let id = self.id;
                    self.leaked_to.get_or_insert_with(|| {
                        // empty lists, so a list without entries expands to no rows
                        let mut sub = Columns::new();
                        sub.insert("leak", id);
                        sub.insert("asn", Value::List(Vec::new()));
                        sub.insert("as_name", Value::List(Vec::new()));
                        sub
                    });
                    self.recipients(rest)?;
                }
            }
            State::LeakedTo => self.recipients(line)?,
            State::Closed => self.fields(line)?,
        }
        Ok(())
    }

    fn fields(&mut self, line: &str) -> anyhow::Result<()> {
        let columns = &mut self.columns;
        if let Some(rest) = after(line, START) {
            columns.insert("start_time", timestamp(rest, START)?);
        }
        if let Some(rest) = after(line, PREFIX) {
            // <prefix> (AS<n> <name>)
            let rest = strip_markup(rest);
            let prefix = rest
                .split_whitespace()
                .next()
                .with_context(|| format!("{PREFIX} empty in {line:?}"))?;
            columns.insert("prefix", prefix);
            let origin = between(&rest, '(', ')')
                .with_context(|| format!("{PREFIX} origin missing in {line:?}"))?;
            let asn = after(origin, "AS").with_context(|| format!("{PREFIX} no AS in {line:?}"))?;
            columns.insert("original_asn", int(asn, PREFIX)?);
            columns.insert("original_as_name", &*name_after_number(origin));
        }
        if let Some(rest) = after(line, LEAKED_BY) {
            // AS<n> <name>
            let rest = strip_markup(rest);
            let asn = after(&rest, "AS").with_context(|| format!("{LEAKED_BY} no AS in {line:?}"))?;
            columns.insert("leaking_asn", int(asn, LEAKED_BY)?);
            columns.insert("leaking_as_name", &*name_after_number(asn));
        }
        if let Some(rest) = after(line, AS_PATH) {
            columns.insert("as_path", text(rest));
        }
        if let Some(rest) = after(line, PEERS) {
            columns.insert("number_of_peers", int(colon_value(rest, PEERS)?, PEERS)?);
        }
        Ok(())
    }

    fn recipients(&mut self, text: &str) -> anyhow::Result<()> {
        let (list, closed) = match text.split_once(CELL_END) {
            Some((list, _)) => (list, true),
            None => (text, false),
        };

        let Some(sub) = self.leaked_to.as_mut() else {
            anyhow::bail!("recipient list entered without a parent record");
        };
        for item in list.split(ITEM).skip(1) {
            // <asn> (<name>)
            let item = strip_markup(item);
            let Some(asn) = item.split_whitespace().next() else {
                anyhow::bail!("{LEAKED_TO} empty entry");
            };
            let name = between(&item, '(', ')')
                .with_context(|| format!("{LEAKED_TO} entry {asn} has no AS name"))?;
            sub.push("asn", asn);
            sub.push("as_name", name.trim());
        }

        if closed {
            self.state = State::Closed;
        }
        Ok(())
    }

    pub fn finish(self) -> (Columns, Option<Columns>) {
        if self.state == State::LeakedTo {
            tracing::debug!(target: "extract", "[#{}] recipient list never closed", self.id);
        }
        (self.columns, self.leaked_to)
    }
}

/// Words after the leading AS number, e.g. `1234 Foo Corp` gives `Foo Corp`.
fn name_after_number(text: &str) -> String {
    text.split_whitespace().skip(1).collect::<Vec<_>>().join(" ")
}

pub fn parse(id: i64, page: &str) -> anyhow::Result<(Columns, Option<Columns>)> {
    let mut scanner = Scanner::new(id);
    for line in page.lines() {
        scanner.line(line)?;
    }
    Ok(scanner.finish())
}
