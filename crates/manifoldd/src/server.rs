//! HTTP surface: one streaming chat endpoint and a health check.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, instrument, warn};

use manifold_core::{ExternalEvent, RunDriver, RunError, RunHandle, RunRequest};

#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<RunDriver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

fn sse_event(event: &ExternalEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.data().to_string())
}

/// POST /api/chat/stream — start a run and stream its events.
///
/// Dropping the connection drops the event receiver, which cancels the run.
#[instrument(skip_all)]
async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Response {
    let RunHandle {
        run_id,
        events,
        task,
    } = match state.driver.spawn(request) {
        Ok(handle) => handle,
        Err(RunError::EmptyInput) => {
            return error_response(StatusCode::BAD_REQUEST, &RunError::EmptyInput.to_string());
        }
        Err(e) => {
            warn!(error = %e, "run rejected");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };
    info!(%run_id, "streaming run");

    tokio::spawn(async move {
        match task.await {
            Ok(report) => info!(%run_id, status = ?report.status, "run stopped"),
            Err(e) => warn!(%run_id, error = %e, "run task aborted"),
        }
    });

    let stream = ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// GET /healthz
async fn health_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "team": state.driver.team().names(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::fakes::{ScriptedDecider, ScriptedGenerator};
    use manifold_core::{assemble, Collaborators, ManifoldConfig, ModelRegistry};
    use tokio::net::TcpListener;

    async fn serve(generator: ScriptedGenerator) -> String {
        let collaborators = Collaborators {
            models: ModelRegistry::new(Arc::new(generator)),
            decider: Arc::new(ScriptedDecider::sequence(&["FINISH"])),
            search: None,
        };
        let driver = assemble(&ManifoldConfig::default(), collaborators).unwrap();
        let app = router(AppState {
            driver: Arc::new(driver),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_chat_stream_emits_named_events() {
        let base = serve(ScriptedGenerator::new().reply(&["Hi", " there"])).await;
        let body = reqwest::Client::new()
            .post(format!("{base}/api/chat/stream"))
            .json(&json!({
                "messages": [{"role": "user", "content": "hello"}],
                "deep_thinking_mode": false,
                "search_before_planning": false,
            }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("event: start_of_agent"));
        assert!(body.contains(r#""content":"Hi there""#));
        assert!(body.contains("event: end_of_workflow"));
        assert!(!body.contains("start_of_workflow"));
    }

    #[tokio::test]
    async fn test_empty_messages_is_bad_request() {
        let base = serve(ScriptedGenerator::new()).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/chat/stream"))
            .json(&json!({ "messages": [] }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains("at least one message"));
    }

    #[tokio::test]
    async fn test_health_lists_team() {
        let base = serve(ScriptedGenerator::new()).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/healthz"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["team"][0], "researcher");
    }
}
