//! API client for communicating with the sentinel service

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Non-success answer from the sentinel API
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        self.status == StatusCode::CONFLICT
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// API client for the sentinel service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            // A manual scan runs a full pass before answering
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request with query parameters
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(ApiError { status, message }.into());
        }

        response.json().await.context("Failed to parse response")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckRequest {
    pub by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use sentinel_lib::store::Page;
    use sentinel_lib::Notification;

    const NOTIFICATION: &str = r#"{
        "id": 7, "provider": "hyperv", "vm_id": null, "vm_name": "hv-01",
        "metric": "DISK", "value_pct": 91.0, "threshold_pct": 85.0, "env": "PROD",
        "at": "2024-01-01T12:00:00Z", "status": "OPEN", "ack_by": null,
        "ack_at": null, "cleared_at": null, "created_at": "2024-01-01T12:01:00Z",
        "archived": false, "disks": [{"used_pct": 91.0, "size_gib": 40.0}],
        "dedupe_key": "hyperv:hv-01:disk:2024-01-01T12"
    }"#;

    #[tokio::test]
    async fn test_get_sends_query_and_decodes_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/notifications")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "OPEN".into()),
                Matcher::UrlEncoded("limit".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"items": [{NOTIFICATION}], "total": 1, "limit": 10, "offset": 0}}"#
            ))
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let page: Page<Notification> = client
            .get(
                "api/notifications",
                &[("status", "OPEN".to_string()), ("limit", "10".to_string())],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].vm_name, "hv-01");
        assert_eq!(page.items[0].disks.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/notifications/7/ack")
            .match_body(Matcher::Json(serde_json::json!({ "by": "oncall" })))
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "notification 7 is ACK, expected OPEN"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post::<Notification, _>(
                "api/notifications/7/ack",
                &AckRequest {
                    by: "oncall".to_string(),
                },
            )
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(api_err.is_conflict());
        assert_eq!(api_err.message, "notification 7 is ACK, expected OPEN");
    }

    #[tokio::test]
    async fn test_plain_text_error_is_kept() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/audit")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<serde_json::Value>("api/audit", &[])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "API error (502 Bad Gateway): bad gateway");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
