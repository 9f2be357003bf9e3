//! HTTPS client for a single history archive.

use url::Url;

use crate::archive_state::HistoryArchiveState;
use crate::error::HistoryError;
use crate::Result;

/// Path of the root History Archive State document within an archive.
const ROOT_HAS_PATH: &str = ".well-known/stellar-history.json";

/// A client for one history archive endpoint.
///
/// Archives are static file trees; every operation is a plain HTTPS GET
/// relative to the base URL.
#[derive(Debug, Clone)]
pub struct HistoryArchive {
    base_url: Url,
    client: reqwest::Client,
}

impl HistoryArchive {
    /// Create a client for the archive rooted at `url`.
    pub fn new(url: &str) -> Result<Self> {
        // Normalize to a trailing slash so Url::join treats the last path
        // segment as a directory.
        let mut base = url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    /// The archive's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the root History Archive State document.
    pub async fn get_root_has(&self) -> Result<HistoryArchiveState> {
        let url = self.base_url.join(ROOT_HAS_PATH)?;
        tracing::debug!(url = %url, "fetching root history archive state");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        HistoryArchiveState::from_json(&body)
    }
}

/// Testnet archive endpoints published by SDF.
pub mod testnet {
    /// SDF testnet history archives.
    pub const ARCHIVE_URLS: &[&str] = &[
        "https://history.stellar.org/prd/core-testnet/core_testnet_001",
        "https://history.stellar.org/prd/core-testnet/core_testnet_002",
        "https://history.stellar.org/prd/core-testnet/core_testnet_003",
    ];
}

/// Mainnet archive endpoints published by SDF.
pub mod mainnet {
    /// SDF mainnet history archives.
    pub const ARCHIVE_URLS: &[&str] = &[
        "https://history.stellar.org/prd/core-live/core_live_001",
        "https://history.stellar.org/prd/core-live/core_live_002",
        "https://history.stellar.org/prd/core-live/core_live_003",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_trailing_slash() {
        let a = HistoryArchive::new("http://example.com/archive").unwrap();
        let b = HistoryArchive::new("http://example.com/archive/").unwrap();
        assert_eq!(a.base_url(), b.base_url());
        assert_eq!(
            a.base_url().join(ROOT_HAS_PATH).unwrap().as_str(),
            "http://example.com/archive/.well-known/stellar-history.json"
        );
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(HistoryArchive::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_get_root_has_from_loopback_archive() {
        use axum::{routing::get, Json, Router};

        let app = Router::new().route(
            "/.well-known/stellar-history.json",
            get(|| async {
                Json(serde_json::json!({
                    "version": 2,
                    "server": "stellar-core-test",
                    "currentLedger": 4096,
                    "currentBuckets": []
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let archive = HistoryArchive::new(&format!("http://{addr}")).unwrap();
        let has = archive.get_root_has().await.unwrap();
        assert_eq!(has.current_ledger(), 4096);
    }

    #[tokio::test]
    async fn test_get_root_has_surfaces_http_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, axum::Router::new()).await.unwrap();
        });

        let archive = HistoryArchive::new(&format!("http://{addr}")).unwrap();
        let err = archive.get_root_has().await.unwrap_err();
        assert!(matches!(err, HistoryError::HttpStatus { status: 404, .. }));
    }
}
