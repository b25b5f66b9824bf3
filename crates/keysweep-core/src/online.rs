//! Online activity check

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Balance-query endpoint; `{address}` is replaced with the identifier
pub const DEFAULT_ENDPOINT: &str = "https://blockchain.info/q/getreceivedbyaddress/{address}";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    #[error("Unexpected response body: {0:?}")]
    UnexpectedBody(String),
}

/// External "has this identifier ever been used" check
pub trait ActivityCheck: Send + Sync {
    fn check_activity(&self, identifier: &str) -> Result<bool, NetworkError>;
}

/// HTTP checker against a received-amount endpoint
pub struct HttpActivityChecker {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpActivityChecker {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keysweep/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn url(&self, identifier: &str) -> String {
        if self.endpoint.contains("{address}") {
            self.endpoint.replace("{address}", identifier)
        } else {
            format!("{}/{}", self.endpoint.trim_end_matches('/'), identifier)
        }
    }
}

impl ActivityCheck for HttpActivityChecker {
    fn check_activity(&self, identifier: &str) -> Result<bool, NetworkError> {
        let response = self.client.get(self.url(identifier)).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }

        let body = response.text()?;
        debug!(identifier, body = body.trim(), "activity response");
        parse_received(&body)
    }
}

/// A received amount greater than zero means active
pub fn parse_received(body: &str) -> Result<bool, NetworkError> {
    let trimmed = body.trim();
    trimmed
        .parse::<i128>()
        .map(|received| received > 0)
        .map_err(|_| NetworkError::UnexpectedBody(trimmed.chars().take(64).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_received() {
        assert!(parse_received("5000\n").unwrap());
        assert!(!parse_received("0").unwrap());
        assert!(matches!(
            parse_received("<html>rate limited</html>"),
            Err(NetworkError::UnexpectedBody(_))
        ));
    }

    #[test]
    fn test_url_templating() {
        let templated = HttpActivityChecker::new(DEFAULT_ENDPOINT, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            templated.url("1abc"),
            "https://blockchain.info/q/getreceivedbyaddress/1abc"
        );

        let plain = HttpActivityChecker::new("http://localhost:8080/received/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(plain.url("1abc"), "http://localhost:8080/received/1abc");
    }

    #[test]
    fn test_unreachable_endpoint_is_an_error() {
        // Port 9 (discard) is closed on test machines; either refused or timed out
        let checker =
            HttpActivityChecker::new("http://127.0.0.1:9/{address}", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            checker.check_activity("1abc"),
            Err(NetworkError::Transport(_))
        ));
    }
}
