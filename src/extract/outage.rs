use anyhow::Context;

use super::{colon_value, int, text, timestamp};
use crate::{
    event::Columns,
    util::{after, between, strip_markup},
};

const START: &str = "Start time:";
const END: &str = "End time:";
const DETECTED: &str = "we detected an outage";
const PREFIXES: &str = "Number of Prefixes";

fn affected(line: &str, columns: &mut Columns) -> anyhow::Result<()> {
    if let Some(rest) = after(line, "ASN") {
        let rest = strip_markup(rest);
        columns.insert("asn", int(&rest, "outage ASN")?);
        let name = between(&rest, '(', ')').with_context(|| format!("outage AS name missing in {line:?}"))?;
        columns.insert("as_name", text(name));
    } else {
        // country-wide outage: no AS, only the country name
        let country = after(line, "for ")
            .map(strip_markup)
            .and_then(|rest| {
                rest.split_whitespace()
                    .next()
                    .map(|w| w.trim_end_matches(['.', ',']).to_owned())
            })
            .with_context(|| format!("outage country missing in {line:?}"))?;
        columns.insert("asn", 0i64);
        columns.insert("as_name", &*country);
    }
    Ok(())
}

fn prefixes(rest: &str, columns: &mut Columns) -> anyhow::Result<()> {
    let value = colon_value(rest, PREFIXES)?;
    columns.insert("number_of_prefixes", int(value, PREFIXES)?);

    let percent = between(value, '(', '%')
        .map(|p| strip_markup(p).trim().to_owned())
        .with_context(|| format!("{PREFIXES}: percentage missing in {value:?}"))?;
    let percent = percent
        .parse::<f64>()
        .with_context(|| format!("{PREFIXES}: bad percentage {percent:?}"))?;
    columns.insert("percentage", percent / 100.0);
    Ok(())
}

/// Outage pages carry every field on its own line, so no state is kept between lines.
pub fn parse(id: i64, page: &str) -> anyhow::Result<Columns> {
    let mut columns = Columns::new();
    columns.insert("id", id);

    for line in page.lines() {
        if let Some(rest) = after(line, START) {
            columns.insert("start_time", timestamp(rest, START)?);
        } else if let Some(rest) = after(line, END) {
            columns.insert("end_time", timestamp(rest, END)?);
        } else if line.contains(DETECTED) {
            affected(line, &mut columns)?;
        } else if let Some(rest) = after(line, PREFIXES) {
            prefixes(rest, &mut columns)?;
        }
    }

    Ok(columns)
}
