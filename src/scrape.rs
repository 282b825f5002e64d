use core::time::Duration;
use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use rand::Rng;
use reqwest::Client as Request;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub fn basic() -> reqwest::Result<Request> {
    Request::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(const { Duration::from_secs(8) })
        .timeout(const { Duration::from_secs(30) })
        .build()
}

/// Supplies the raw page of an event.
pub trait PageSource {
    /// `Ok(None)` means the catalog answered with a server error and the event is skipped.
    async fn fetch(&self, id: i64) -> anyhow::Result<Option<String>>;
}

/// Reads pages from a flat cache directory, downloading and storing misses.
pub struct CachedPages {
    pub client: Request,
    pub base_url: String,
    pub dir: PathBuf,
    /// Pause after each download, jittered by up to a quarter.
    pub delay: Duration,
}

impl CachedPages {
    pub fn cache_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{id}.txt"))
    }

    pub fn url(&self, id: i64) -> String {
        format!("{}/event/{id}", self.base_url.trim_end_matches('/'))
    }

    async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        let max = self.delay.as_millis() as u64;
        let jitter = rand::rng().random_range(0..=max / 4);
        tokio::time::sleep(self.delay + Duration::from_millis(jitter)).await;
    }

    async fn download(&self, id: i64) -> anyhow::Result<Option<String>> {
        let url = self.url(id);
        tracing::debug!(target: "scrape", "[#{id}] \x1b[33mdownloading\x1b[0m {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.is_server_error() {
            tracing::debug!(target: "scrape", "[#{id}] {status}, skipped");
            return Ok(None);
        }

        let body = response.text().await?;
        let path = self.cache_path(id);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("cannot cache {}", path.display()))?;
        Ok(Some(body))
    }
}

impl PageSource for CachedPages {
    async fn fetch(&self, id: i64) -> anyhow::Result<Option<String>> {
        let path = self.cache_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                tracing::debug!(target: "scrape", "[#{id}] cached at {}", path.display());
                return Ok(Some(text));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
        }

        let result = self.download(id).await;
        self.pause().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    fn pages(base_url: &str, dir: PathBuf) -> CachedPages {
        CachedPages {
            client: Request::builder().no_proxy().build().unwrap(),
            base_url: base_url.into(),
            dir,
            delay: Duration::ZERO,
        }
    }

    async fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bgpm-{name}-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        tokio::fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    /// Answers `/event/500` with a 500 and every other path with `page at <path>`.
    async fn catalog() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0; 4096];
                    let mut n = 0;
                    while !buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
                        let read = stream.read(&mut buf[n..]).await.unwrap();
                        if read == 0 {
                            return;
                        }
                        n += read;
                    }
                    let head = String::from_utf8_lossy(&buf[..n]);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_owned();
                    let (status, body) = if path.ends_with("/500") {
                        ("500 Internal Server Error", "oops".to_owned())
                    } else {
                        ("200 OK", format!("page at {path}"))
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    stream.write_all(response.as_bytes()).await.unwrap();
                });
            }
        });
        format!("http://{addr}/")
    }

    #[test]
    fn layout() {
        let source = pages("http://127.0.0.1:9/", PathBuf::from("html"));
        assert_eq!(source.cache_path(1234), PathBuf::from("html/1234.txt"));
        assert_eq!(source.url(1234), "http://127.0.0.1:9/event/1234");
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let dir = temp_dir("hit").await;
        tokio::fs::write(dir.join("77.txt"), "cached page").await.unwrap();

        // nothing listens here, so any network access fails
        let source = pages("http://127.0.0.1:9/", dir.clone());
        assert_eq!(source.fetch(77).await.unwrap().as_deref(), Some("cached page"));
        assert!(source.fetch(78).await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn miss_is_downloaded_and_cached() {
        let dir = temp_dir("miss").await;
        let source = pages(&catalog().await, dir.clone());

        assert_eq!(source.fetch(42).await.unwrap().as_deref(), Some("page at /event/42"));
        let cached = tokio::fs::read_to_string(dir.join("42.txt")).await.unwrap();
        assert_eq!(cached, "page at /event/42");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_skipped_and_not_cached() {
        let dir = temp_dir("5xx").await;
        let source = pages(&catalog().await, dir.clone());

        assert_eq!(source.fetch(500).await.unwrap(), None);
        assert!(!dir.join("500.txt").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn download_overwrites_the_cache_file() {
        let dir = temp_dir("overwrite").await;
        tokio::fs::write(dir.join("41.txt"), "a much longer stale page body").await.unwrap();
        let source = pages(&catalog().await, dir.clone());

        assert_eq!(source.download(41).await.unwrap().as_deref(), Some("page at /event/41"));
        let cached = tokio::fs::read_to_string(dir.join("41.txt")).await.unwrap();
        assert_eq!(cached, "page at /event/41");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
