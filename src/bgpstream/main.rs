mod db;

use core::time::Duration;
use std::path::PathBuf;

use bgpm::{
    db::{DBConfig, get_connection, init_db},
    ingest::Ingestor,
    scrape::{CachedPages, basic},
    timeline::{Fixed, Timeline},
};
use either::Either;

/// Mirrors BGPStream outage, leak and hijack reports into PostgreSQL.
#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    /// print every insert statement before running it
    #[arg(short = 'x', long)]
    debug: bool,
    /// drop and recreate the schema before filling it
    #[arg(short, long)]
    clear_database: bool,
    /// database user
    #[arg(short, long, env = "DB_USER", default_value = "database")]
    username: String,
    /// database name
    #[arg(short, long, env = "DB_NAME", default_value = "bgpstream")]
    database: String,
}

/// Runtime settings that are not worth a flag.
struct Settings {
    db_host: Option<String>,
    db_password: Option<String>,
    base_url: String,
    cache_dir: PathBuf,
    sql_dir: PathBuf,
    delay: Duration,
    bearer_token: Option<String>,
    account: String,
    latest: Option<i64>,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        let delay = match var("BGPSTREAM_DELAY_MS") {
            Some(ms) => Duration::from_millis(ms.parse()?),
            None => const { Duration::from_millis(500) },
        };
        let latest = var("BGPSTREAM_LATEST").map(|n| n.parse()).transpose()?;

        Ok(Self {
            db_host: var("DB_HOST"),
            db_password: var("DB_PASSWORD"),
            base_url: var("BGPSTREAM_URL").unwrap_or_else(|| "https://bgpstream.com".into()),
            cache_dir: var("BGPSTREAM_CACHE").unwrap_or_else(|| "html".into()).into(),
            sql_dir: var("BGPSTREAM_SQL").unwrap_or_else(|| "sql".into()).into(),
            delay,
            bearer_token: var("TWITTER_BEARER_TOKEN"),
            account: var("TWITTER_ACCOUNT").unwrap_or_else(|| "bgpstream".into()),
            latest,
        })
    }
}

fn init_logger(debug: bool) {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_level(if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    let args = Args::parse();
    init_logger(args.debug);
    let settings = Settings::from_env()?;

    tokio::fs::create_dir_all(&settings.cache_dir).await?;

    init_db(&DBConfig {
        host: settings.db_host,
        user: Some(args.username),
        dbname: Some(args.database),
        password: settings.db_password,
    })
    .await?;

    let mut store = db::PgStore::new(get_connection().await?, args.debug);
    if args.clear_database {
        store.clear().await?;
    }
    store.ensure_schema(&settings.sql_dir).await?;
    tracing::info!(target: "main", "\x1b[32mschema ready, mirroring {}\x1b[0m", settings.base_url);

    let client = basic()?;

    let timeline = match (settings.latest, settings.bearer_token) {
        (Some(latest), _) => Either::Left(Fixed(latest)),
        (None, Some(bearer_token)) => Either::Right(Timeline {
            client: client.clone(),
            api_base: Timeline::DEFAULT_API.into(),
            bearer_token,
            account: settings.account.into(),
        }),
        (None, None) => anyhow::bail!("set TWITTER_BEARER_TOKEN or BGPSTREAM_LATEST"),
    };

    let pages = CachedPages {
        client,
        base_url: settings.base_url,
        dir: settings.cache_dir,
        delay: settings.delay,
    };

    let mut ingestor = Ingestor {
        pages,
        timeline,
        store,
    };
    let summary = ingestor.run().await?;
    summary.report();

    Ok(())
}
