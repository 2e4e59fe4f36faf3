use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, instrument, warn};

use super::schema::{parse_items, GenerateContentRequest, GenerateContentResponse};
use crate::config::{Language, RecognitionConfig};
use crate::meals::model::FoodItem;

/// Every way a recognition pass can fail collapses into this one error.
/// `reason` is kept for logs only.
#[derive(Debug, Clone, thiserror::Error)]
#[error("recognition failed: {reason}")]
pub struct RecognitionFailed {
    pub reason: String,
}

impl RecognitionFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A still frame as uploaded by the front end.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub base64: String,
    pub content_type: String,
}

#[async_trait]
pub trait FoodRecognizer: Send + Sync {
    /// One external call, no retries. An empty list means no food was found.
    async fn recognize(&self, image: &CapturedImage) -> Result<Vec<FoodItem>, RecognitionFailed>;
}

pub struct GeminiRecognizer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    language: Language,
}

impl GeminiRecognizer {
    pub fn new(config: &RecognitionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("build recognition http client: {e}"))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            language: config.language,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl FoodRecognizer for GeminiRecognizer {
    #[instrument(skip(self, image), fields(model = %self.model, image_len = image.base64.len()))]
    async fn recognize(&self, image: &CapturedImage) -> Result<Vec<FoodItem>, RecognitionFailed> {
        let body = GenerateContentRequest::new(&image.base64, &image.content_type, self.language);

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timeout" } else { "transport" };
                error!(error = %e, kind, "recognition request failed");
                RecognitionFailed::new(format!("{kind}: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(%status, body = %text, "recognition service returned an error");
            return Err(RecognitionFailed::new(format!("service status {status}")));
        }

        let payload: GenerateContentResponse = resp.json().await.map_err(|e| {
            error!(error = %e, "recognition response is not valid json");
            RecognitionFailed::new(format!("undecodable response: {e}"))
        })?;

        let Some(text) = payload.text() else {
            warn!("recognition response carried no candidate text");
            return Err(RecognitionFailed::new("empty candidate"));
        };

        let items = parse_items(&text).map_err(|reason| {
            error!(%reason, "recognition response failed validation");
            RecognitionFailed::new(reason)
        })?;
        debug!(items = items.len(), "food recognized");
        Ok(items)
    }
}


#[cfg(test)]
mod client_tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_fake_service(reply: (StatusCode, Value)) -> String {
        let app = Router::new().route(
            "/v1beta/models/:model",
            post(move |Path(model): Path<String>, Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    assert!(model.ends_with(":generateContent"));
                    assert!(body["contents"][0]["parts"][0]["inlineData"]["data"].is_string());
                    (reply.0, Json(reply.1))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1beta")
    }

    fn recognizer(endpoint: String) -> GeminiRecognizer {
        GeminiRecognizer::new(&RecognitionConfig {
            api_key: "test-key".into(),
            model: "gemini-test".into(),
            endpoint,
            timeout_secs: 5,
            language: Language::Zh,
        })
        .unwrap()
    }

    fn image() -> CapturedImage {
        CapturedImage {
            base64: "aW1n".into(),
            content_type: "image/jpeg".into(),
        }
    }

    fn candidate(text: &str) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    #[tokio::test]
    async fn recognizes_items_from_service() {
        let text = r#"[{"name":"苹果","portion":"1个","calories":95,
            "boundingBox":{"ymin":10,"xmin":10,"ymax":200,"xmax":200}}]"#;
        let endpoint = spawn_fake_service((StatusCode::OK, candidate(text))).await;
        let items = recognizer(endpoint).recognize(&image()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "苹果");
    }

    #[tokio::test]
    async fn empty_list_is_not_a_failure() {
        let endpoint = spawn_fake_service((StatusCode::OK, candidate("[]"))).await;
        let items = recognizer(endpoint).recognize(&image()).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn missing_field_is_recognition_failed() {
        let text = r#"[{"name":"苹果","calories":95,
            "boundingBox":{"ymin":10,"xmin":10,"ymax":200,"xmax":200}}]"#;
        let endpoint = spawn_fake_service((StatusCode::OK, candidate(text))).await;
        assert!(recognizer(endpoint).recognize(&image()).await.is_err());
    }

    #[tokio::test]
    async fn service_error_is_recognition_failed() {
        let endpoint = spawn_fake_service((
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": {"message": "boom"}}),
        ))
        .await;
        let err = recognizer(endpoint).recognize(&image()).await.unwrap_err();
        assert!(err.reason.contains("500"));
    }

    #[tokio::test]
    async fn unreachable_service_is_recognition_failed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = recognizer(format!("http://{addr}/v1beta"))
            .recognize(&image())
            .await
            .unwrap_err();
        assert!(err.reason.starts_with("transport"));
    }
}
