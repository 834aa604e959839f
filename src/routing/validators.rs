//! Relay validator directory

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use super::RoutingError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ValidatorEntry {
    vote_account: String,
    #[serde(default)]
    running_jito: bool,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResponse {
    validators: Vec<ValidatorEntry>,
}

/// HTTP client for the relay's validator listing.
pub struct ValidatorDirectory {
    client: reqwest::Client,
    url: String,
}

impl ValidatorDirectory {
    pub fn new(url: impl Into<String>) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Vote accounts of validators currently running the relay client.
    pub async fn fetch_relay_vote_accounts(&self) -> Result<HashSet<String>, RoutingError> {
        let response = self
            .client
            .get(&self.url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| RoutingError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Http(format!(
                "failed to fetch validators: {}",
                status
            )));
        }

        let body: ValidatorsResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::Http(format!("bad validators payload: {}", e)))?;

        Ok(body
            .validators
            .into_iter()
            .filter(|v| v.running_jito)
            .map(|v| v.vote_account)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_running_validators_are_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/validators")
            .match_header("accept", "application/json")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"validators":[
                    {"vote_account":"VoteA","running_jito":true,"active_stake":10},
                    {"vote_account":"VoteB","running_jito":false},
                    {"vote_account":"VoteC"}
                ]}"#,
            )
            .create_async()
            .await;

        let directory =
            ValidatorDirectory::new(format!("{}/api/v1/validators", server.url())).unwrap();
        let relay = directory.fetch_relay_vote_accounts().await.unwrap();

        assert_eq!(relay.len(), 1);
        assert!(relay.contains("VoteA"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/validators")
            .with_status(503)
            .create_async()
            .await;

        let directory =
            ValidatorDirectory::new(format!("{}/api/v1/validators", server.url())).unwrap();
        let err = directory.fetch_relay_vote_accounts().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
