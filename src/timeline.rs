use anyhow::Context;
use compact_str::CompactString;
use either::Either;
use reqwest::Client as Request;
use serde::Deserialize;

/// Tells which event number the catalog has reached.
pub trait LatestEvent {
    async fn latest_event(&self) -> anyhow::Result<i64>;
}

/// A pinned event number, used instead of asking the timeline.
#[derive(Clone, Copy, Debug)]
pub struct Fixed(pub i64);

impl LatestEvent for Fixed {
    async fn latest_event(&self) -> anyhow::Result<i64> {
        Ok(self.0)
    }
}

impl<A: LatestEvent, B: LatestEvent> LatestEvent for Either<A, B> {
    async fn latest_event(&self) -> anyhow::Result<i64> {
        match self {
            Either::Left(a) => a.latest_event().await,
            Either::Right(b) => b.latest_event().await,
        }
    }
}

/// Reads the newest event link from the catalog's announcement account.
pub struct Timeline {
    pub client: Request,
    pub api_base: String,
    pub bearer_token: String,
    pub account: CompactString,
}

#[derive(Deserialize)]
struct UserResp {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: CompactString,
}

#[derive(Debug, Deserialize)]
struct TweetsResp {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    entities: Option<Entities>,
}

#[derive(Debug, Deserialize)]
struct Entities {
    #[serde(default)]
    urls: Vec<Url>,
}

#[derive(Debug, Deserialize)]
struct Url {
    expanded_url: Option<String>,
}

/// The last path segment of an event link, e.g. `https://bgpstream.com/event/12345`.
pub fn event_number(url: &str) -> Option<i64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

fn newest_event(resp: &TweetsResp) -> Option<i64> {
    resp.data
        .iter()
        .filter_map(|tweet| tweet.entities.as_ref())
        .flat_map(|entities| &entities.urls)
        .filter_map(|url| url.expanded_url.as_deref())
        .find_map(event_number)
}

impl Timeline {
    pub const DEFAULT_API: &'static str = "https://api.twitter.com/2";

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> anyhow::Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

impl LatestEvent for Timeline {
    async fn latest_event(&self) -> anyhow::Result<i64> {
        let base = self.api_base.trim_end_matches('/');
        let account = &self.account;

        let user: UserResp = self
            .get(&format!("{base}/users/by/username/{account}"))
            .await
            .with_context(|| format!("cannot resolve @{account}"))?;
        let uid = user.data.id;

        let tweets: TweetsResp = self
            .get(&format!("{base}/users/{uid}/tweets?max_results=5&tweet.fields=entities"))
            .await
            .with_context(|| format!("cannot read the timeline of @{account}"))?;

        let latest = newest_event(&tweets)
            .with_context(|| format!("no event link in the latest posts of @{account}"))?;
        tracing::info!(target: "timeline", "@{account} points at event \x1b[1;36m#{latest}\x1b[0m");
        Ok(latest)
    }
}
