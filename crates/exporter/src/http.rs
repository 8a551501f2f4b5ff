use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::collector::Collector;

#[derive(Clone)]
pub struct AppState {
    collector: Arc<Collector>,
    metrics_path: Arc<str>,
}

pub fn router(collector: Arc<Collector>, metrics_path: &str) -> Router {
    let state = AppState {
        collector,
        metrics_path: Arc::from(metrics_path),
    };
    Router::new()
        .route("/", get(landing))
        .route("/healthz", get(healthz))
        .route(metrics_path, get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn landing(State(st): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>FAH Exporter</title></head>
<body>
<h1>FAH Exporter</h1>
<p><a href="{path}">Metrics</a></p>
</body>
</html>
"#,
        path = st.metrics_path
    ))
}

async fn metrics(State(st): State<AppState>) -> Result<Response, AppError> {
    let body = st.collector.scrape().await?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}
