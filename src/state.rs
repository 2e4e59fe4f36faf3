use std::sync::Arc;

use crate::capture::CaptureFlow;
use crate::config::AppConfig;
use crate::meals::store::MealStore;
use crate::recognition::{FoodRecognizer, GeminiRecognizer};
use crate::storage::{FileStorage, HistoryStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<MealStore>,
    pub captures: Arc<CaptureFlow>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let storage = Arc::new(FileStorage::new(&config.data_dir).await?) as Arc<dyn HistoryStorage>;
        let recognizer =
            Arc::new(GeminiRecognizer::new(&config.recognition)?) as Arc<dyn FoodRecognizer>;

        Self::from_parts(config, storage, recognizer).await
    }

    pub async fn from_parts(
        config: Arc<AppConfig>,
        storage: Arc<dyn HistoryStorage>,
        recognizer: Arc<dyn FoodRecognizer>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(
            MealStore::load(storage)
                .await
                .map_err(|e| anyhow::anyhow!("{e}; move or repair the history file to continue"))?,
        );
        let captures = Arc::new(CaptureFlow::new(recognizer, store.clone()));
        Ok(Self {
            config,
            store,
            captures,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{Language, RecognitionConfig};
    use crate::recognition::ScriptedRecognizer;
    use crate::storage::MemoryStorage;
    use axum::{
        body::Body,
        http::{HeaderMap, Method, Request, StatusCode},
        Router,
    };
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use time::UtcOffset;
    use tower::ServiceExt;

    pub fn fake_config() -> AppConfig {
        AppConfig {
            data_dir: std::env::temp_dir(),
            recognition: RecognitionConfig {
                api_key: "test".into(),
                model: "test".into(),
                endpoint: "http://127.0.0.1:9".into(),
                timeout_secs: 1,
                language: Language::Zh,
            },
            daily_target_kcal: 2000.0,
            language: Language::En,
            utc_offset: UtcOffset::UTC,
        }
    }

    pub async fn fake_state() -> (AppState, Arc<ScriptedRecognizer>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::default());
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let state = AppState::from_parts(
            Arc::new(fake_config()),
            storage.clone() as Arc<dyn HistoryStorage>,
            recognizer.clone() as Arc<dyn FoodRecognizer>,
        )
        .await
        .expect("fake state");
        (state, recognizer, storage)
    }

    pub async fn send_raw(app: &Router, method: Method, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    /// Sends a JSON request and parses the JSON reply (`Null` for empty bodies).
    pub async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn corrupt_history_aborts_state_init() {
        let storage = Arc::new(MemoryStorage::with_blob(crate::storage::HISTORY_KEY, "[{"));
        let result = AppState::from_parts(
            Arc::new(fake_config()),
            storage as Arc<dyn HistoryStorage>,
            Arc::new(ScriptedRecognizer::default()) as Arc<dyn FoodRecognizer>,
        )
        .await;
        let err = result.err().expect("corrupt history must fail");
        assert!(err.to_string().contains("unreadable"));
    }
}
