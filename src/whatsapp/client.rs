//! WhatsApp Cloud API client
//!
//! Thin wrapper over the Graph `/{phone_number_id}/messages` and media
//! endpoints. Non-2xx responses become [`Error::Api`] with the Graph error
//! object attached so callers can classify them.

use crate::config::Config;
use crate::error::{ApiError, Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// WhatsApp text message character limit.
pub const MAX_TEXT_LENGTH: usize = 4096;

const SERVICE: &str = "WhatsApp";

/// A pre-approved template with its body parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMessage {
    pub name: String,
    pub language: String,
    pub body_params: Vec<String>,
}

impl TemplateMessage {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            body_params: Vec::new(),
        }
    }

    pub fn with_param(mut self, value: impl Into<String>) -> Self {
        self.body_params.push(value.into());
        self
    }

    fn to_json(&self) -> Value {
        let mut template = json!({
            "name": self.name,
            "language": { "code": self.language },
        });
        if !self.body_params.is_empty() {
            let parameters: Vec<Value> = self
                .body_params
                .iter()
                .map(|p| json!({ "type": "text", "text": p }))
                .collect();
            template["components"] = json!([{ "type": "body", "parameters": parameters }]);
        }
        template
    }
}

/// Downloaded media object.
#[derive(Debug, Clone)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<Value>;

    async fn send_template(&self, to: &str, template: &TemplateMessage) -> Result<Value>;

    async fn send_image(&self, to: &str, link: &str, caption: Option<&str>) -> Result<Value>;

    async fn download_media(&self, media_id: &str) -> Result<Media>;
}

/// Graph API implementation of [`MessagingApi`].
#[derive(Clone)]
pub struct CloudApiClient {
    http: Client,
    api_url: String,
    phone_number_id: String,
    access_token: String,
}

impl CloudApiClient {
    pub fn new(
        http: Client,
        api_url: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self::new(
            http,
            config.graph_api_url(),
            &config.phone_number_id,
            &config.access_token,
        ))
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_url, self.phone_number_id)
    }

    async fn post_message(&self, payload: Value) -> Result<Value> {
        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api {
                service: SERVICE,
                status: status.as_u16(),
                error: ApiError::from_body(&body),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MessagingApi for CloudApiClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<Value> {
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": false, "body": truncate_text(body) },
        }))
        .await
    }

    async fn send_template(&self, to: &str, template: &TemplateMessage) -> Result<Value> {
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": template.to_json(),
        }))
        .await
    }

    async fn send_image(&self, to: &str, link: &str, caption: Option<&str>) -> Result<Value> {
        let mut image = json!({ "link": link });
        if let Some(caption) = caption {
            image["caption"] = json!(caption);
        }
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "image",
            "image": image,
        }))
        .await
    }

    async fn download_media(&self, media_id: &str) -> Result<Media> {
        // Step 1: resolve the short-lived download URL
        let meta_url = format!("{}/{}", self.api_url, media_id);
        let response = self
            .http
            .get(&meta_url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                service: SERVICE,
                status: status.as_u16(),
                error: ApiError::from_body(&body),
            });
        }

        let meta: Value = serde_json::from_str(&body)?;
        let url = meta
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Media(format!("no download URL for media {}", media_id)))?;
        let mime_type = meta
            .get("mime_type")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .to_string();

        // Step 2: download the bytes (same bearer token)
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Media(format!(
                "download of media {} failed with HTTP {}",
                media_id,
                response.status()
            )));
        }
        let bytes = response.bytes().await?.to_vec();

        tracing::debug!("WhatsApp: downloaded media {} ({} bytes, {})", media_id, bytes.len(), mime_type);
        Ok(Media { bytes, mime_type })
    }
}

/// Cut a message to the WhatsApp character limit.
pub fn truncate_text(content: &str) -> String {
    if content.chars().count() <= MAX_TEXT_LENGTH {
        return content.to_string();
    }
    let suffix = "…";
    let prefix: String = content.chars().take(MAX_TEXT_LENGTH - 1).collect();
    format!("{}{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> CloudApiClient {
        CloudApiClient::new(
            Client::new(),
            format!("{}/v24.0", server.url()),
            "1234567890",
            "test-token",
        )
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v24.0/1234567890/messages")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::PartialJson(json!({
                "to": "33612345678",
                "type": "text",
                "text": { "body": "Salut !" }
            })))
            .with_status(200)
            .with_body(r#"{"messaging_product":"whatsapp","messages":[{"id":"wamid.A"}]}"#)
            .create_async()
            .await;

        let response = client(&server).send_text("33612345678", "Salut !").await.unwrap();
        assert_eq!(response["messages"][0]["id"], "wamid.A");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_text_window_closed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v24.0/1234567890/messages")
            .with_status(400)
            .with_body(r#"{"error":{"message":"(#131047) Re-engagement message","type":"OAuthException","code":131047,"error_subcode":2494010}}"#)
            .create_async()
            .await;

        let err = client(&server).send_text("33612345678", "hello").await.unwrap_err();
        assert!(err.is_window_closed());
        assert!(matches!(err, Error::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_send_template_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v24.0/1234567890/messages")
            .match_body(Matcher::PartialJson(json!({
                "type": "template",
                "template": {
                    "name": "relance_24h",
                    "language": { "code": "fr" },
                    "components": [{
                        "type": "body",
                        "parameters": [{ "type": "text", "text": "Léa" }]
                    }]
                }
            })))
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"wamid.T"}]}"#)
            .create_async()
            .await;

        let template = TemplateMessage::new("relance_24h", "fr").with_param("Léa");
        client(&server)
            .send_template("33612345678", &template)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_template_without_params_has_no_components() {
        let json = TemplateMessage::new("hello_world", "en_US").to_json();
        assert!(json.get("components").is_none());
        assert_eq!(json["language"]["code"], "en_US");
    }

    #[tokio::test]
    async fn test_download_media_two_steps() {
        let mut server = mockito::Server::new_async().await;
        let file_url = format!("{}/files/voice.ogg", server.url());
        server
            .mock("GET", "/v24.0/media-42")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(json!({ "url": file_url, "mime_type": "audio/ogg; codecs=opus" }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/files/voice.ogg")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(vec![1u8, 2, 3])
            .create_async()
            .await;

        let media = client(&server).download_media("media-42").await.unwrap();
        assert_eq!(media.bytes, vec![1, 2, 3]);
        assert_eq!(media.mime_type, "audio/ogg; codecs=opus");
    }

    #[tokio::test]
    async fn test_download_media_missing_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v24.0/media-42")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let err = client(&server).download_media("media-42").await.unwrap_err();
        assert!(matches!(err, Error::Media(_)));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("court"), "court");
        let long = "é".repeat(5000);
        let cut = truncate_text(&long);
        assert_eq!(cut.chars().count(), MAX_TEXT_LENGTH);
        assert!(cut.ends_with('…'));
    }
}
