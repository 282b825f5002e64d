use std::collections::HashMap;

use bgpm::{
    event::{Record, Table, Value},
    ingest::{EventStore, Ingestor, Summary},
    plan::HighWater,
    scrape::PageSource,
    timeline::Fixed,
};

/// Pages by event number. `None` plays a 5xx answer, a missing entry a transport error.
#[derive(Default)]
struct Pages(HashMap<i64, Option<String>>);

impl Pages {
    fn with(mut self, id: i64, page: impl Into<String>) -> Self {
        self.0.insert(id, Some(page.into()));
        self
    }

    fn server_error(mut self, id: i64) -> Self {
        self.0.insert(id, None);
        self
    }
}

impl PageSource for Pages {
    async fn fetch(&self, id: i64) -> anyhow::Result<Option<String>> {
        match self.0.get(&id) {
            Some(page) => Ok(page.clone()),
            None => anyhow::bail!("connection refused for #{id}"),
        }
    }
}

/// Commits all rows of an event or none, like a transaction.
#[derive(Default)]
struct MemoryStore {
    rows: Vec<Record>,
    /// Fails the event as soon as a row for this table is written.
    reject: Option<Table>,
}

impl EventStore for MemoryStore {
    async fn high_water(&mut self) -> anyhow::Result<HighWater> {
        let mut high_water = HighWater::default();
        for record in &self.rows {
            if let Some(&Value::Int(id)) = record.columns.get("id") {
                let current = high_water.get(record.table).unwrap_or(0);
                high_water.set(record.table, current.max(id));
            }
        }
        Ok(high_water)
    }

    async fn insert_event(&mut self, id: i64, records: &[Record]) -> anyhow::Result<u64> {
        let mut staged = Vec::new();
        for record in records {
            if self.reject == Some(record.table) {
                anyhow::bail!("[#{id}] constraint violated on {}", record.table);
            }
            staged.push(record.clone());
        }
        let n = staged.len() as u64;
        self.rows.extend(staged);
        Ok(n)
    }
}

impl MemoryStore {
    fn ids(&self, table: Table) -> Vec<i64> {
        self.rows
            .iter()
            .filter(|r| r.table == table)
            .filter_map(|r| match r.columns.get("id").or_else(|| r.columns.get("leak")) {
                Some(&Value::Int(id)) => Some(id),
                _ => None,
            })
            .collect()
    }
}

fn outage(asn: i64) -> String {
    format!(
        "<h3>BGP, AS outage</h3>
<tr><td>Start time: 2019-03-28 17:45:00 UTC</td></tr>
<tr><td>End time: 2019-03-28 18:02:00 UTC</td></tr>
<p>Starting at 2019-03-28 17:45:00 UTC we detected an outage for ASN {asn} (<b>Example</b>),</p>
<p>Number of Prefixes Affected: 4 (25%)</p>"
    )
}

const LEAK: &str = "<h3>BGP Leak</h3>
<tr><td>Start time: 2019-05-02 06:11:00 UTC</td></tr>
<tr><td>Leaked prefix: 192.0.2.0/24 (AS64500 Example Networks)</td></tr>
<tr><td>Leaked by: AS64501 Leaky Transit</td></tr>
<tr><td>Leaked To:<ul>
<li>AS1 (One)</li>
<li>AS2 (Two)</li>
<li>AS3 (Three)</li>
</ul></td></tr>";

const HIJACK: &str = "<h3>Possible hijack</h3>
<tr><td>Start time: 2020-07-14 09:30:12 UTC</td></tr>
<tr><td>Expected prefix: 198.51.100.0/24</td></tr>
<tr><td>Expected ASN: 64500 (Example Networks)</td></tr>
<tr><td>Detected Origin ASN 64666 (Bad Actor)</td></tr>
<tr><td>Detected by number of BGPMon peers: 9</td></tr>";

fn stored(rows: &[i64]) -> MemoryStore {
    MemoryStore {
        rows: rows
            .iter()
            .map(|&id| Record {
                table: Table::Outage,
                columns: [("id", Value::Int(id))].into_iter().collect(),
            })
            .collect(),
        reject: None,
    }
}

#[tokio::test]
async fn resumes_above_the_stored_maximum() {
    let mut pages = Pages::default();
    for id in 100..=130 {
        pages = pages.with(id, outage(id));
    }
    let mut ingestor = Ingestor {
        pages,
        timeline: Fixed(125),
        store: stored(&[118, 120]),
    };

    let summary = ingestor.run().await.unwrap();
    assert_eq!(summary.inserted, [125, 124, 123, 122, 121]);
    assert_eq!(summary.rows, 5);
    assert!(summary.failed.is_empty());
    assert_eq!(ingestor.store.ids(Table::Outage), [118, 120, 125, 124, 123, 122, 121]);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let pages = Pages::default().with(3, outage(1)).with(2, HIJACK).with(1, LEAK);
    let mut ingestor = Ingestor {
        pages,
        timeline: Fixed(3),
        store: MemoryStore::default(),
    };

    let first = ingestor.run().await.unwrap();
    assert_eq!(first.inserted, [3, 2, 1]);
    let rows = ingestor.store.rows.len();

    let second = ingestor.run().await.unwrap();
    assert_eq!(second, Summary::default());
    assert_eq!(ingestor.store.rows.len(), rows);
}

#[tokio::test]
async fn resume_point_spans_every_event_table() {
    // the newest stored event is a hijack, older outages must not be refetched
    let pages = Pages::default().with(12, outage(5)).with(11, outage(6));
    let mut store = stored(&[7]);
    store.rows.push(Record {
        table: Table::Hijack,
        columns: [("id", Value::Int(10))].into_iter().collect(),
    });
    let mut ingestor = Ingestor {
        pages,
        timeline: Fixed(12),
        store,
    };

    let summary = ingestor.run().await.unwrap();
    assert_eq!(summary.inserted, [12, 11]);
}

#[tokio::test]
async fn leak_recipients_become_rows() {
    let mut ingestor = Ingestor {
        pages: Pages::default().with(50, LEAK),
        timeline: Fixed(50),
        store: MemoryStore::default(),
    };

    let summary = ingestor.run().await.unwrap();
    assert_eq!(summary.inserted, [50]);
    assert_eq!(summary.rows, 4);

    let tables = ingestor.store.rows.iter().map(|r| r.table).collect::<Vec<_>>();
    assert_eq!(tables, [Table::Leak, Table::Leaker, Table::Leaker, Table::Leaker]);
    assert_eq!(ingestor.store.ids(Table::Leaker), [50, 50, 50]);
    let names = ingestor.store.rows[1..]
        .iter()
        .map(|r| r.columns.get("as_name").cloned())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        [Some("One".into()), Some("Two".into()), Some("Three".into())]
    );
}

#[tokio::test]
async fn skips_server_errors_and_unclassified_pages() {
    let pages = Pages::default()
        .with(4, outage(4))
        .server_error(3)
        .with(2, "<html><body>Maintenance</body></html>")
        .with(1, HIJACK);
    let mut ingestor = Ingestor {
        pages,
        timeline: Fixed(4),
        store: MemoryStore::default(),
    };

    let summary = ingestor.run().await.unwrap();
    assert_eq!(summary.inserted, [4, 1]);
    assert_eq!(summary.skipped, [3, 2]);
    assert!(summary.failed.is_empty());
    assert_eq!(ingestor.store.ids(Table::Outage), [4]);
    assert_eq!(ingestor.store.ids(Table::Hijack), [1]);
}

#[tokio::test]
async fn malformed_pages_fail_alone() {
    let broken = "BGP, AS outage\nStart time: yesterday\n";
    let pages = Pages::default().with(9, outage(9)).with(8, broken).with(6, outage(6));
    let mut ingestor = Ingestor {
        pages,
        timeline: Fixed(9),
        store: stored(&[5]),
    };

    let summary = ingestor.run().await.unwrap();
    assert_eq!(summary.inserted, [9, 6]);
    let failed = summary.failed.iter().map(|(id, _)| *id).collect::<Vec<_>>();
    // 8 cannot be parsed, 7 cannot be fetched
    assert_eq!(failed, [8, 7]);
    assert!(summary.failed[0].1.contains("Start time"));
}

#[tokio::test]
async fn failed_insert_keeps_nothing_of_the_event() {
    let mut ingestor = Ingestor {
        pages: Pages::default().with(21, outage(21)).with(20, LEAK),
        timeline: Fixed(21),
        store: MemoryStore {
            reject: Some(Table::Leaker),
            ..stored(&[19])
        },
    };

    let summary = ingestor.run().await.unwrap();
    assert_eq!(summary.inserted, [21]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, 20);
    assert!(summary.failed[0].1.contains("constraint violated"));
    // the parent leak row was staged before the failure and must be gone too
    assert!(ingestor.store.ids(Table::Leak).is_empty());
    assert!(ingestor.store.ids(Table::Leaker).is_empty());
}
