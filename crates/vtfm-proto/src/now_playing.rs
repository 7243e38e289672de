//! Now-playing title lookup.
//!
//! `GET {base}get_{slug}_track` returns a JSON array whose first element
//! carries the current `track_title`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Shown whenever the engine has no track loaded.
pub const DEFAULT_TITLE: &str = "Vocal Trance FM - Beat Trance Radio in Moldova";

#[derive(Debug, Error)]
pub enum NowPlayingError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("response contained no tracks")]
    Empty,
    #[error("first track has no title")]
    MissingTitle,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    #[serde(default)]
    track_title: Option<String>,
}

/// Extract `[0].track_title` from a response body.
pub fn parse_track_title(body: &[u8]) -> Result<String, NowPlayingError> {
    let entries: Vec<TrackEntry> = serde_json::from_slice(body)?;
    let first = entries.into_iter().next().ok_or(NowPlayingError::Empty)?;
    first
        .track_title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(NowPlayingError::MissingTitle)
}

/// Anything that can answer "what is playing on this station".
#[async_trait]
pub trait TitleSource: Send + Sync {
    async fn fetch_title(&self, slug: &str) -> Result<String, NowPlayingError>;
}

pub struct HttpTitleSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTitleSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NowPlayingError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vtfm/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self, slug: &str) -> String {
        format!("{}get_{}_track", self.base_url, slug)
    }
}

#[async_trait]
impl TitleSource for HttpTitleSource {
    async fn fetch_title(&self, slug: &str) -> Result<String, NowPlayingError> {
        let url = self.endpoint(slug);
        debug!("[now-playing] GET {}", url);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NowPlayingError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        parse_track_title(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_title() {
        let body = br#"[{"track_title":"Aly & Fila - Shine"},{"track_title":"older"}]"#;
        assert_eq!(parse_track_title(body).unwrap(), "Aly & Fila - Shine");
    }

    #[test]
    fn test_parse_trims_title() {
        let body = br#"[{"track_title":"  X  ","track_id":7}]"#;
        assert_eq!(parse_track_title(body).unwrap(), "X");
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(matches!(parse_track_title(b"[]"), Err(NowPlayingError::Empty)));
    }

    #[test]
    fn test_parse_missing_or_blank_title() {
        assert!(matches!(
            parse_track_title(br#"[{"artist":"a"}]"#),
            Err(NowPlayingError::MissingTitle)
        ));
        assert!(matches!(
            parse_track_title(br#"[{"track_title":"   "}]"#),
            Err(NowPlayingError::MissingTitle)
        ));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_track_title(b"<html>oops</html>"),
            Err(NowPlayingError::Malformed(_))
        ));
        assert!(matches!(
            parse_track_title(br#"{"track_title":"X"}"#),
            Err(NowPlayingError::Malformed(_))
        ));
    }

    #[test]
    fn test_endpoint_appends_slash() {
        let src = HttpTitleSource::new("https://vocaltrance.fm/api/v1", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            src.endpoint("deep"),
            "https://vocaltrance.fm/api/v1/get_deep_track"
        );
    }
}
