// Pull transport: the game client's local live-data endpoint.
//
// The endpoint serves a self-signed certificate on loopback, so certificate
// validation is off for this client only.

use async_trait::async_trait;
use scoreboard_core::normalize::ShapeError;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("live client request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("live client returned status {0}")]
    Status(u16),

    #[error("live client response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Anything that can produce the raw player list.
#[async_trait]
pub trait LiveClientSource: Send + Sync {
    async fn fetch_players(&self) -> Result<Value, PollError>;
}

pub struct LiveClientHttp {
    http: reqwest::Client,
    url: String,
}

impl LiveClientHttp {
    pub fn new(url: impl Into<String>) -> Result<Self, PollError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LiveClientSource for LiveClientHttp {
    async fn fetch_players(&self) -> Result<Value, PollError> {
        let response = self.http.get(&self.url).send().await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(PollError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "live client response received");
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering the first request with `response`.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        });

        format!("http://{addr}/liveclientdata/playerlist")
    }

    #[tokio::test]
    async fn parses_player_array() {
        let body = r#"[{"summonerName":"Faker"}]"#;
        let url = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let source = LiveClientHttp::new(url).unwrap();
        let players = source.fetch_players().await.unwrap();
        assert_eq!(players[0]["summonerName"], "Faker");
    }

    #[tokio::test]
    async fn server_error_is_status_failure() {
        let url =
            serve_once("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".into())
                .await;

        let source = LiveClientHttp::new(url).unwrap();
        let err = source.fetch_players().await.unwrap_err();
        assert!(matches!(err, PollError::Status(500)), "got {err}");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_failure() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 5\r\n\r\n[{,]}"
                .into(),
        )
        .await;

        let source = LiveClientHttp::new(url).unwrap();
        let err = source.fetch_players().await.unwrap_err();
        assert!(matches!(err, PollError::Parse(_)), "got {err}");
    }

    #[tokio::test]
    async fn refused_connection_is_transport_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = LiveClientHttp::new(format!("http://{addr}/")).unwrap();
        let err = source.fetch_players().await.unwrap_err();
        assert!(matches!(err, PollError::Transport(_)), "got {err}");
    }
}
