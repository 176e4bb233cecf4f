//! Route modules for the Amnesia spread service

pub mod health;
pub mod split;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Full API router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/split", split::router())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::db::memory_pool;
    use crate::oracle::MockOracle;

    #[tokio::test]
    async fn test_health() {
        let state = AppState::with_oracle(
            Config::default(),
            memory_pool().await,
            Arc::new(MockOracle::spread(500)),
        );
        let app = router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["oracleAvailable"], true);
    }
}
