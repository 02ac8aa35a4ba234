//! IPC server: axum HTTP router over the channel's Unix socket.
//!
//! Route handlers never run dispatch handlers themselves. Execute requests
//! are queued to the single [`Dispatcher`](crate::dispatch::Dispatcher) and
//! the response waits for its verdict.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::types::*;
use crate::daemon::ShutdownSignal;
use crate::dispatch::Transaction;

/// Shared state accessible to all IPC route handlers.
pub struct ServerState {
    /// Service name reported by negotiation and discovery.
    pub service: String,
    pub queue: mpsc::Sender<Transaction>,
}

/// A bound channel socket. The socket file is removed when this (or the
/// server it turns into) is dropped.
pub struct Registration {
    listener: UnixListener,
    guard: SocketGuard,
}

struct SocketGuard {
    path: PathBuf,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if std::fs::remove_file(&self.path).is_ok() {
            debug!(path = %self.path.display(), "channel socket removed");
        }
    }
}

/// Register the channel by binding its socket.
///
/// A leftover socket file from an earlier daemon is replaced. Nothing stops
/// a second live daemon from taking over the name this way.
pub fn register(socket_path: &Path) -> std::io::Result<Registration> {
    if socket_path.exists() {
        warn!(path = %socket_path.display(), "replacing existing channel socket");
        std::fs::remove_file(socket_path)?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "channel registered");

    Ok(Registration {
        listener,
        guard: SocketGuard {
            path: socket_path.to_path_buf(),
        },
    })
}

impl Registration {
    pub fn path(&self) -> &Path {
        &self.guard.path
    }

    /// Serve requests until a shutdown signal arrives, then unregister.
    pub async fn serve(
        self,
        state: Arc<ServerState>,
        mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    ) -> std::io::Result<()> {
        let Registration { listener, guard } = self;

        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("IPC server shutting down");
            })
            .await?;

        drop(guard);
        Ok(())
    }
}

/// Build the axum router with all IPC routes.
pub fn router(state: Arc<ServerState>) -> axum::Router {
    axum::Router::new()
        .route("/topics", get(handle_discover))
        .route("/topics/{topic}", get(handle_negotiate))
        .route("/topics/{topic}/execute", post(handle_execute))
        .with_state(state)
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_discover(State(state): State<Arc<ServerState>>) -> Json<TopicsResponse> {
    let pairs = Topic::ALL
        .into_iter()
        .map(|topic| ServiceTopic {
            service: state.service.clone(),
            topic,
        })
        .collect();
    Json(TopicsResponse { pairs })
}

async fn handle_negotiate(
    State(state): State<Arc<ServerState>>,
    UrlPath(topic): UrlPath<String>,
) -> Result<Json<ConnectResponse>, (StatusCode, Json<ErrorResponse>)> {
    match topic.parse::<Topic>() {
        Ok(topic) => {
            debug!(%topic, "connection accepted");
            Ok(Json(ConnectResponse {
                service: state.service.clone(),
                topic,
            }))
        }
        Err(e) => {
            debug!(error = %e, "connection rejected");
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

async fn handle_execute(
    State(state): State<Arc<ServerState>>,
    UrlPath(topic): UrlPath<String>,
    body: Bytes,
) -> Response {
    // The payload ends at the first NUL.
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let (txn, reply) = Transaction::new(topic, body[..end].to_vec());

    let outcome = match state.queue.try_send(txn) {
        Ok(()) => reply.await.unwrap_or(Outcome::Busy),
        Err(e) => {
            warn!(error = %e, "dispatch queue unavailable");
            Outcome::Busy
        }
    };
    (status_for(outcome), Json(AckResponse { outcome })).into_response()
}

fn status_for(outcome: Outcome) -> StatusCode {
    match outcome {
        Outcome::Acknowledged => StatusCode::OK,
        Outcome::Declined => StatusCode::UNPROCESSABLE_ENTITY,
        Outcome::NotProcessed => StatusCode::NOT_FOUND,
        Outcome::Busy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn test_state(depth: usize) -> (Arc<ServerState>, mpsc::Receiver<Transaction>) {
        let (queue, rx) = mpsc::channel(depth);
        let state = Arc::new(ServerState {
            service: "handoff".to_string(),
            queue,
        });
        (state, rx)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_discover_lists_fixed_topics() {
        let (state, _rx) = test_state(1);
        let req = Request::get("/topics").body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let topics: TopicsResponse = body_json(resp).await;
        let expected: Vec<_> = Topic::ALL
            .into_iter()
            .map(|topic| ServiceTopic {
                service: "handoff".to_string(),
                topic,
            })
            .collect();
        assert_eq!(topics.pairs, expected);
    }

    #[tokio::test]
    async fn test_negotiate_accepts_known_topics() {
        let (state, _rx) = test_state(1);
        for topic in Topic::ALL {
            let req = Request::get(format!("/topics/{topic}"))
                .body(Body::empty())
                .unwrap();
            let resp = router(state.clone()).oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let accepted: ConnectResponse = body_json(resp).await;
            assert_eq!(accepted.topic, topic);
        }
    }

    #[tokio::test]
    async fn test_negotiate_rejects_unknown_topic() {
        let (state, _rx) = test_state(1);
        let req = Request::get("/topics/status").body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let err: ErrorResponse = body_json(resp).await;
        assert!(err.error.contains("status"));
    }

    #[tokio::test]
    async fn test_execute_queues_truncated_payload() {
        let (state, mut rx) = test_state(1);
        let consumer = tokio::spawn(async move {
            let txn = rx.recv().await.unwrap();
            let seen = (txn.topic.clone(), txn.payload.clone());
            txn.reply.send(Outcome::Declined).unwrap();
            seen
        });

        let req = Request::post("/topics/exec/execute")
            .body(Body::from(&b"ls -l\0garbage"[..]))
            .unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let ack: AckResponse = body_json(resp).await;
        assert_eq!(ack.outcome, Outcome::Declined);

        let (topic, payload) = consumer.await.unwrap();
        assert_eq!(topic, "exec");
        assert_eq!(payload, b"ls -l");
    }

    #[tokio::test]
    async fn test_execute_full_queue_is_busy() {
        let (state, _rx) = test_state(1);
        let (filler, _filler_rx) = Transaction::new("exec", Vec::new());
        state.queue.try_send(filler).unwrap();

        let req = Request::post("/topics/exec/execute")
            .body(Body::from("ls"))
            .unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let ack: AckResponse = body_json(resp).await;
        assert_eq!(ack.outcome, Outcome::Busy);
    }

    #[tokio::test]
    async fn test_execute_dropped_reply_is_busy() {
        let (state, mut rx) = test_state(1);
        tokio::spawn(async move {
            // Take the transaction and drop it unanswered.
            let _ = rx.recv().await;
        });

        let req = Request::post("/topics/exit/execute")
            .body(Body::empty())
            .unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        let ack: AckResponse = body_json(resp).await;
        assert_eq!(ack.outcome, Outcome::Busy);
    }

    #[tokio::test]
    async fn test_register_replaces_stale_socket_and_cleans_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("handoff.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let registration = register(&path).unwrap();
        assert_eq!(registration.path(), path);
        assert!(path.exists());

        drop(registration);
        assert!(!path.exists());
    }
}
