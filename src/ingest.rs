use anyhow::Context;

use crate::{
    event::{EventKind, Record},
    extract::extract,
    plan::{HighWater, plan},
    scrape::PageSource,
    timeline::LatestEvent,
};

/// Persistent side of the mirror.
pub trait EventStore {
    async fn high_water(&mut self) -> anyhow::Result<HighWater>;

    /// Writes all `records` of event `id` in one transaction, or none of them.
    async fn insert_event(&mut self, id: i64, records: &[Record]) -> anyhow::Result<u64>;
}

/// What happened to each event number of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub inserted: Vec<i64>,
    pub rows: u64,
    /// Server errors and unclassified pages.
    pub skipped: Vec<i64>,
    pub failed: Vec<(i64, String)>,
}

impl Summary {
    pub fn report(&self) {
        tracing::info!(
            target: "ingest",
            "\x1b[36m{} events ({} rows) inserted, {} skipped, {} failed\x1b[0m",
            self.inserted.len(),
            self.rows,
            self.skipped.len(),
            self.failed.len(),
        );
        if !self.skipped.is_empty() {
            tracing::info!(target: "ingest", "skipped: {:?}", self.skipped);
        }
        for (id, reason) in &self.failed {
            tracing::warn!(target: "ingest", "\x1b[31m[#{id}] {reason}\x1b[0m");
        }
    }
}

enum Outcome {
    Inserted(u64),
    Skipped(&'static str),
}

/// Drives fetch, extract, expand and insert for every planned event, one at a time.
pub struct Ingestor<P, L, S> {
    pub pages: P,
    pub timeline: L,
    pub store: S,
}

impl<P: PageSource, L: LatestEvent, S: EventStore> Ingestor<P, L, S> {
    /// Mirrors everything between the stored high-water mark and the newest event.
    pub async fn run(&mut self) -> anyhow::Result<Summary> {
        let latest = self.timeline.latest_event().await.context("latest event")?;
        let high_water = self.store.high_water().await.context("stored high-water mark")?;
        let range = plan(latest, &high_water);
        tracing::info!(
            target: "ingest",
            "latest event #{latest}, stored up to #{} ({high_water:?}): {} to fetch",
            high_water.global(),
            range.len(),
        );
        Ok(self.ingest(range).await)
    }

    /// Processes `ids` in order. Failures are recorded and never stop the batch.
    pub async fn ingest<I: IntoIterator<Item = i64>>(&mut self, ids: I) -> Summary {
        let mut summary = Summary::default();
        for id in ids {
            match self.event(id).await {
                Ok(Outcome::Inserted(rows)) => {
                    summary.inserted.push(id);
                    summary.rows += rows;
                }
                Ok(Outcome::Skipped(why)) => {
                    tracing::info!(target: "ingest", "[#{id}] skipped: {why}");
                    summary.skipped.push(id);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", "[#{id}] {e:#}");
                    summary.failed.push((id, format!("{e:#}")));
                }
            }
        }
        summary
    }

    async fn event(&mut self, id: i64) -> anyhow::Result<Outcome> {
        let Some(page) = self.pages.fetch(id).await.context("fetch")? else {
            return Ok(Outcome::Skipped("server error"));
        };

        let extraction = extract(id, &page).context("extract")?;
        if extraction.kind == EventKind::Unknown {
            return Ok(Outcome::Skipped("unclassified page"));
        }

        let records = extraction.records();
        let rows = self.store.insert_event(id, &records).await.context("insert")?;
        tracing::info!(target: "ingest", "[#{id}] {} \x1b[36m{rows} rows\x1b[0m", extraction.kind);
        Ok(Outcome::Inserted(rows))
    }
}
