//! Split detection API routes

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{BookExampleCount, TrainingExampleRepository};
use crate::error::{AppError, Result};
use crate::labeling::{LabelOutcome, PageRef};
use crate::split::{is_valid_example, BookContext, HeuristicSplit, ImageSource, SplitFeatures, SplitModel};
use crate::state::AppState;

/// Create the split router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/detect", post(detect))
        .route("/features", post(features))
        .route("/predict", post(predict))
        .route("/label", post(label))
        .route("/train", post(retrain))
        .route("/model", get(current_model))
        .route("/examples/stats", get(example_stats))
}

/// Image given either by URL or inline as base64
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
}

impl ImageInput {
    fn source(&self) -> Result<ImageSource> {
        match (&self.image_url, &self.image_base64) {
            (Some(url), None) => Ok(ImageSource::Url(url.clone())),
            (None, Some(encoded)) => Ok(ImageSource::from_base64(encoded)?),
            (Some(_), Some(_)) => Err(AppError::BadRequest(
                "Provide either imageUrl or imageBase64, not both".to_string(),
            )),
            (None, None) => Err(AppError::BadRequest(
                "imageUrl or imageBase64 is required".to_string(),
            )),
        }
    }
}

/// Optional position of the page inside its book
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub page_index: Option<usize>,
    pub page_count: Option<usize>,
}

impl PageContext {
    fn book_context(&self) -> Option<BookContext> {
        match (self.page_index, self.page_count) {
            (Some(page_index), Some(page_count)) if page_count > 0 => Some(BookContext {
                page_index,
                page_count,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesRequest {
    #[serde(flatten)]
    pub image: ImageInput,
    #[serde(flatten)]
    pub context: PageContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[serde(flatten)]
    pub image: ImageInput,
    #[serde(flatten)]
    pub context: PageContext,
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub split_position: i32,
    pub namespace: String,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRequest {
    #[serde(flatten)]
    pub image: ImageInput,
    #[serde(flatten)]
    pub context: PageContext,
    pub page_id: String,
    pub book_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub namespace: String,
    #[serde(flatten)]
    pub model: SplitModel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleStats {
    pub total: usize,
    pub valid: usize,
    pub by_book: Vec<BookExampleCount>,
}

/// Run CPU-bound image work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Image task failed: {}", e)))?
}

async fn load_image(state: &AppState, image: &ImageInput) -> Result<Vec<u8>> {
    let source = image.source()?;
    Ok(source.load(state.http()).await?)
}

async fn extract_features(state: &AppState, image: &ImageInput, context: PageContext) -> Result<SplitFeatures> {
    let image_data = load_image(state, image).await?;
    let extractor = *state.extractor();
    let context = context.book_context();
    blocking(move || Ok(extractor.extract_bytes(&image_data, context)?)).await
}

/// Fast heuristic split; undecodable or unreachable images get the fallback
async fn detect(State(state): State<AppState>, Json(image): Json<ImageInput>) -> Result<Json<HeuristicSplit>> {
    let image_data = match load_image(&state, &image).await {
        Ok(data) => data,
        Err(e @ AppError::BadRequest(_)) => return Err(e),
        Err(e) => {
            tracing::warn!("Heuristic detection falling back: {}", e);
            return Ok(Json(HeuristicSplit::FALLBACK));
        }
    };

    let detector = *state.detector();
    let split = blocking(move || Ok(detector.detect_bytes(&image_data))).await?;
    Ok(Json(split))
}

/// Full feature vector for one image
async fn features(State(state): State<AppState>, Json(request): Json<FeaturesRequest>) -> Result<Json<SplitFeatures>> {
    let features = extract_features(&state, &request.image, request.context).await?;
    Ok(Json(features))
}

/// Model-backed split prediction
async fn predict(State(state): State<AppState>, Json(request): Json<PredictRequest>) -> Result<Json<PredictResponse>> {
    let namespace = request
        .namespace
        .unwrap_or_else(|| state.namespace().to_string());

    let model = state
        .trainer()
        .current_model(&namespace)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No split model trained for namespace '{}'", namespace)))?;

    let features = extract_features(&state, &request.image, request.context).await?;
    let split_position = model.predict(&features);
    tracing::debug!("Predicted split {} with model '{}'", split_position, namespace);

    Ok(Json(PredictResponse {
        split_position,
        namespace,
        trained_at: model.trained_at,
    }))
}

/// Ask the oracle and store the result when the page is a spread
async fn label(State(state): State<AppState>, Json(request): Json<LabelRequest>) -> Result<Json<LabelOutcome>> {
    let page = PageRef {
        page_id: request.page_id,
        book_id: request.book_id,
        source: request.image.source()?,
        context: request.context.book_context(),
    };

    let outcome = state.labeler().label_page(&page).await?;
    Ok(Json(outcome))
}

/// Retrain a namespace from the stored corpus
async fn retrain(State(state): State<AppState>, Query(query): Query<NamespaceQuery>) -> Result<Json<ModelResponse>> {
    let namespace = query.namespace.unwrap_or_else(|| state.namespace().to_string());
    let model = state.trainer().retrain(&namespace).await?;

    Ok(Json(ModelResponse {
        namespace,
        model: (*model).clone(),
    }))
}

/// Current model snapshot
async fn current_model(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<ModelResponse>> {
    let namespace = query.namespace.unwrap_or_else(|| state.namespace().to_string());
    let model = state
        .trainer()
        .current_model(&namespace)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No split model trained for namespace '{}'", namespace)))?;

    Ok(Json(ModelResponse {
        namespace,
        model: (*model).clone(),
    }))
}

/// Corpus size, valid examples and per-book counts
async fn example_stats(State(state): State<AppState>) -> Result<Json<ExampleStats>> {
    let repo = TrainingExampleRepository::new(state.db());
    let examples = repo.list_all().await?;
    let by_book = repo.count_by_book().await?;

    Ok(Json(ExampleStats {
        total: examples.len(),
        valid: examples.iter().filter(|e| is_valid_example(e)).count(),
        by_book,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use base64::Engine;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::memory_pool;
    use crate::oracle::MockOracle;
    use crate::split::GrayRaster;

    use super::*;

    fn spread_base64(gutter: u32) -> String {
        let raster = GrayRaster::from_fn(240, 90, |x, y| {
            if (gutter..gutter + 8).contains(&x) {
                20
            } else if y % 3 == 0 && x % 9 != 0 && (10..230).contains(&x) {
                45
            } else {
                235
            }
        });
        let img = image::GrayImage::from_raw(raster.width(), raster.height(), raster.pixels().to_vec())
            .unwrap();
        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(buffer)
    }

    async fn app(oracle: MockOracle) -> (Router, AppState) {
        let mut config = Config::default();
        config.training.seed = Some(9);
        let state = AppState::with_oracle(config, memory_pool().await, Arc::new(oracle));
        let app = Router::new().nest("/api/v1/split", router()).with_state(state.clone());
        (app, state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_detect_finds_gutter() {
        let (app, _) = app(MockOracle::spread(500)).await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/detect",
            serde_json::json!({ "imageBase64": spread_base64(116) }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let position = body["splitPosition"].as_i64().unwrap();
        assert!((480..=520).contains(&position), "position {}", position);
        assert!(body["hasTextWarning"].is_boolean());
    }

    #[tokio::test]
    async fn test_detect_falls_back_on_garbage() {
        let (app, _) = app(MockOracle::spread(500)).await;
        let garbage = base64::engine::general_purpose::STANDARD.encode(b"not an image");
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/detect",
            serde_json::json!({ "imageBase64": garbage }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["splitPosition"], 500);
        assert_eq!(body["hasTextWarning"], false);
    }

    #[tokio::test]
    async fn test_detect_requires_image() {
        let (app, _) = app(MockOracle::spread(500)).await;
        let (status, body) = call(&app, "POST", "/api/v1/split/detect", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_features_rejects_undecodable_image() {
        let (app, _) = app(MockOracle::spread(500)).await;
        let garbage = base64::engine::general_purpose::STANDARD.encode(b"not an image");
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/features",
            serde_json::json!({ "imageBase64": garbage }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_image");
    }

    #[tokio::test]
    async fn test_features_with_book_context() {
        let (app, _) = app(MockOracle::spread(500)).await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/features",
            serde_json::json!({ "imageBase64": spread_base64(116), "pageIndex": 10, "pageCount": 21 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["width"], 240.0);
        assert_eq!(body["pagePosition"], 0.5);
        assert_eq!(body["bookSizeCategory"], 0.0);
    }

    #[tokio::test]
    async fn test_predict_without_model_is_not_found() {
        let (app, _) = app(MockOracle::spread(500)).await;
        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/split/predict",
            serde_json::json!({ "imageBase64": spread_base64(116) }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "GET", "/api/v1/split/model", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_label_train_predict_flow() {
        let (app, _) = app(MockOracle::spread(498)).await;

        for i in 0..9 {
            let (status, body) = call(
                &app,
                "POST",
                "/api/v1/split/label",
                serde_json::json!({
                    "imageBase64": spread_base64(112 + (i % 3) * 2),
                    "pageId": format!("page-{}", i),
                    "bookId": "book-1",
                }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["judgment"]["isTwoPageSpread"], true);
            assert_eq!(body["example"]["groundTruthPosition"], 498.0);
        }

        let (status, body) = call(&app, "POST", "/api/v1/split/train", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["data"]["valid"], 9);
        assert_eq!(body["data"]["total"], 9);

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/split/label",
            serde_json::json!({
                "imageBase64": spread_base64(116),
                "pageId": "page-9",
                "bookId": "book-2",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "GET", "/api/v1/split/examples/stats", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 10);
        assert_eq!(body["valid"], 10);
        assert_eq!(body["byBook"][0]["bookId"], "book-1");
        assert_eq!(body["byBook"][0]["count"], 9);

        let (status, body) = call(&app, "POST", "/api/v1/split/train", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["namespace"], "default");
        assert_eq!(body["trainingSize"], 8);
        assert!(body["coefficients"]["bias"].is_number());

        let (status, body) = call(&app, "GET", "/api/v1/split/model", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trainingSize"], 8);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/predict",
            serde_json::json!({ "imageBase64": spread_base64(116) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let position = body["splitPosition"].as_i64().unwrap();
        assert!((200..=800).contains(&position));
    }

    #[tokio::test]
    async fn test_single_page_label_is_not_stored() {
        let (app, state) = app(MockOracle::single_page()).await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/label",
            serde_json::json!({
                "imageBase64": spread_base64(116),
                "pageId": "page-1",
                "bookId": "book-1",
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["judgment"]["isTwoPageSpread"], false);
        assert!(body.get("example").is_none());
        assert_eq!(TrainingExampleRepository::new(state.db()).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oracle_rate_limit_maps_to_429() {
        let mut oracle = MockOracle::spread(500);
        for _ in 0..10 {
            oracle = oracle.then(Err(crate::oracle::OracleError::RateLimited {
                key_index: Some(0),
                message: "quota".to_string(),
            }));
        }
        let (app, _) = {
            let mut config = Config::default();
            config.labeling.max_retries = 0;
            let state = AppState::with_oracle(config, memory_pool().await, Arc::new(oracle));
            let app = Router::new().nest("/api/v1/split", router()).with_state(state.clone());
            (app, state)
        };

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/split/label",
            serde_json::json!({
                "imageBase64": spread_base64(116),
                "pageId": "page-1",
                "bookId": "book-1",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "rate_limited");
    }
}
