//! REST transport for a Firebase-style realtime database.

use super::RemoteStore;
use crate::sync::SyncError;
use async_trait::async_trait;
use fieldtrack_engine::RemotePatch;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Reads and patches `{base_url}/{root}.json`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    pub fn new(
        base_url: &str,
        root: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint(base_url, root),
            auth_token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }
}

fn endpoint(base_url: &str, root: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let root = root.trim_matches('/');
    if root.is_empty() {
        format!("{base}/.json")
    } else {
        format!("{base}/{root}.json")
    }
}

async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::RemoteStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn read_snapshot(&self) -> Result<Value, SyncError> {
        let response = self
            .authorize(self.client.get(&self.endpoint))
            .send()
            .await?;
        let tree = check_status(response).await?.json::<Value>().await?;
        Ok(tree)
    }

    async fn patch(&self, patch: RemotePatch) -> Result<(), SyncError> {
        let response = self
            .authorize(self.client.patch(&self.endpoint))
            .json(&patch.into_value())
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_root() {
        assert_eq!(
            endpoint("https://demo.firebaseio.com/", "/fieldtrack/"),
            "https://demo.firebaseio.com/fieldtrack.json"
        );
        assert_eq!(
            endpoint("https://demo.firebaseio.com", "/"),
            "https://demo.firebaseio.com/.json"
        );
    }
}
