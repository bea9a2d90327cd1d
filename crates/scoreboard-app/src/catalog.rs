// Static data catalog version lookup.
//
// The overlay maps display names to icon ids through a versioned static
// catalog. We resolve the newest version once at startup and announce it in
// the `ready` event; any failure falls back to the configured version.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

/// Upper bound on the startup lookup; the bridge does not wait longer.
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetch the newest catalog version: the first entry of the versions list.
pub async fn fetch_latest_version(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String> {
    let versions: Vec<String> = http
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .context("catalog versions request failed")?
        .error_for_status()
        .context("catalog versions request rejected")?
        .json()
        .await
        .context("catalog versions response is not a list of strings")?;

    match versions.into_iter().next() {
        Some(version) if !version.trim().is_empty() => Ok(version),
        _ => bail!("catalog versions list is empty"),
    }
}

/// Resolve the catalog version, never failing.
pub async fn resolve_catalog_version(http: &reqwest::Client, url: &str, fallback: &str) -> String {
    match fetch_latest_version(http, url, CATALOG_TIMEOUT).await {
        Ok(version) => {
            info!(version, "Resolved catalog version");
            version
        }
        Err(e) => {
            warn!("Using fallback catalog version {fallback}: {e:#}");
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const FALLBACK: &str = "14.20.1";

    async fn serve_once(status: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        });

        format!("http://{addr}/api/versions.json")
    }

    #[tokio::test]
    async fn picks_first_listed_version() {
        let url = serve_once("200 OK", r#"["15.1.1","15.0.1","14.24.1"]"#).await;
        let http = reqwest::Client::new();

        let version = resolve_catalog_version(&http, &url, FALLBACK).await;
        assert_eq!(version, "15.1.1");
    }

    #[tokio::test]
    async fn server_error_falls_back() {
        let url = serve_once("503 Service Unavailable", "").await;
        let http = reqwest::Client::new();

        assert!(fetch_latest_version(&http, &url, CATALOG_TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn empty_list_falls_back() {
        let url = serve_once("200 OK", "[]").await;
        let http = reqwest::Client::new();

        let version = resolve_catalog_version(&http, &url, FALLBACK).await;
        assert_eq!(version, FALLBACK);
    }

    #[tokio::test]
    async fn silent_service_times_out() {
        // Accepts the connection but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });

        let http = reqwest::Client::new();
        let started = std::time::Instant::now();
        let result = fetch_latest_version(
            &http,
            &format!("http://{addr}/versions.json"),
            Duration::from_millis(200),
        )
        .await;

        assert!(result.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_service_falls_back() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let http = reqwest::Client::new();
        let version =
            resolve_catalog_version(&http, &format!("http://{addr}/versions.json"), FALLBACK).await;
        assert_eq!(version, FALLBACK);
    }
}
