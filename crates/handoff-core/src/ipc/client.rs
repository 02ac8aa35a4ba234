//! IPC client: hands one command to the daemon over its Unix socket.
//!
//! [`UnixConnector`] speaks HTTP/1.1 over the channel socket using `hyper`.
//! [`Client`] layers the launch protocol on top of any [`Connector`]: one
//! negotiated conversation, one execute transaction, a bounded wait for the
//! acknowledgement, and the "no daemon" fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use handoff_config::AppConfig;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;
use hyper::body::Bytes;
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::transport::{ConnectError, Connector, Conversation, TransactError};
use super::types::*;
use crate::BoxFuture;
use crate::autostart::{AutostartError, DaemonStarter};

/// How long a disconnect waits for the connection task to wind down.
const DISCONNECT_GRACE: Duration = Duration::from_millis(200);

/// Opens conversations with a daemon listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    socket_path: PathBuf,
}

impl UnixConnector {
    /// Create a connector targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Create a connector for the channel named in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(super::socket_path(&config.channel))
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Connect and complete the HTTP handshake.
    async fn open(&self, topic: Topic) -> Result<UnixConversation, ConnectError> {
        if !self.socket_path.exists() {
            return Err(ConnectError::NoListener(self.socket_path.clone()));
        }

        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            match e.kind() {
                // A stale socket file with nobody behind it.
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                    ConnectError::NoListener(self.socket_path.clone())
                }
                _ => ConnectError::Io {
                    path: self.socket_path.clone(),
                    source: e,
                },
            }
        })?;

        let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ConnectError::Protocol(format!("HTTP handshake failed: {e}")))?;

        // Drive the connection in the background
        let task = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "channel connection closed with error");
            }
        });

        Ok(UnixConversation {
            topic,
            sender,
            task: Some(task),
        })
    }
}

impl Connector for UnixConnector {
    fn connect(&self, topic: Topic) -> BoxFuture<'_, Result<Box<dyn Conversation>, ConnectError>> {
        Box::pin(async move {
            let mut conversation = self.open(topic).await?;

            let path = format!("/topics/{topic}");
            let (status, body) = round_trip(&mut conversation.sender, hyper::Method::GET, &path, Bytes::new())
                .await
                .map_err(ConnectError::Protocol)?;

            match status {
                StatusCode::OK => {
                    let accepted: ConnectResponse = serde_json::from_slice(&body)
                        .map_err(|e| ConnectError::Protocol(format!("bad connect response: {e}")))?;
                    debug!(service = %accepted.service, topic = %accepted.topic, "conversation established");
                    Ok(Box::new(conversation) as Box<dyn Conversation>)
                }
                StatusCode::NOT_FOUND => Err(ConnectError::Rejected(topic.to_string())),
                other => Err(ConnectError::Protocol(format!("unexpected status: {other}"))),
            }
        })
    }

    fn discover(&self) -> BoxFuture<'_, Result<Vec<ServiceTopic>, ConnectError>> {
        Box::pin(async move {
            // Discovery is not tied to a topic; the conversation is only a
            // carrier for the request.
            let mut conversation = self.open(Topic::Exec).await?;
            let (status, body) = round_trip(&mut conversation.sender, hyper::Method::GET, "/topics", Bytes::new())
                .await
                .map_err(ConnectError::Protocol)?;
            if status != StatusCode::OK {
                return Err(ConnectError::Protocol(format!("unexpected status: {status}")));
            }
            let topics: TopicsResponse = serde_json::from_slice(&body)
                .map_err(|e| ConnectError::Protocol(format!("bad topics response: {e}")))?;
            Ok(topics.pairs)
        })
    }
}

/// A negotiated HTTP/1.1 connection to the daemon.
struct UnixConversation {
    topic: Topic,
    sender: SendRequest<Full<Bytes>>,
    task: Option<JoinHandle<()>>,
}

impl Conversation for UnixConversation {
    fn topic(&self) -> Topic {
        self.topic
    }

    fn execute<'a>(
        &'a mut self,
        payload: &'a [u8],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), TransactError>> {
        Box::pin(async move {
            // The wire payload is NUL-terminated.
            let mut body = Vec::with_capacity(payload.len() + 1);
            body.extend_from_slice(payload);
            body.push(0);

            let path = format!("/topics/{}/execute", self.topic);
            let exchange = round_trip(&mut self.sender, hyper::Method::POST, &path, Bytes::from(body));
            let (status, body) = tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| TransactError::TimedOut(timeout))?
                .map_err(TransactError::Protocol)?;

            let ack: AckResponse = serde_json::from_slice(&body).map_err(|e| {
                TransactError::Protocol(format!("bad acknowledgement (status {status}): {e}"))
            })?;

            match ack.outcome {
                Outcome::Acknowledged => Ok(()),
                Outcome::Declined => Err(TransactError::NotHandled),
                Outcome::NotProcessed => Err(TransactError::NoHandler(self.topic)),
                Outcome::Busy => Err(TransactError::Busy),
            }
        })
    }

    fn disconnect(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        let task = self.task.take();
        // Dropping the sender lets the connection close cleanly.
        drop(self);
        Box::pin(async move {
            if let Some(mut task) = task {
                if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                    task.abort();
                }
            }
        })
    }
}

impl Drop for UnixConversation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Send one request on an established connection and collect the response.
async fn round_trip(
    sender: &mut SendRequest<Full<Bytes>>,
    method: hyper::Method,
    path: &str,
    body: Bytes,
) -> Result<(StatusCode, Bytes), String> {
    sender
        .ready()
        .await
        .map_err(|e| format!("connection closed: {e}"))?;

    let mut builder = hyper::Request::builder()
        .method(method)
        .uri(path)
        .header("host", "localhost");
    if !body.is_empty() {
        builder = builder.header("content-type", "application/octet-stream");
    }
    let req = builder
        .body(Full::new(body))
        .map_err(|e| format!("failed to build request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| format!("failed to read response body: {e}"))?
        .to_bytes();
    Ok((status, body))
}

// ── Launch protocol ────────────────────────────────────────────────────

/// What happened to a request the client sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The daemon acknowledged the transaction.
    Acknowledged,
    /// `exit` found no daemon; there was nothing to stop.
    AlreadyStopped,
    /// `exec` found no daemon, so one was started with the command queued.
    DaemonStarted { pid: u32 },
}

/// Errors from [`Client::send`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Transact(#[from] TransactError),

    #[error("no daemon was running and starting one failed: {0}")]
    Autostart(#[from] AutostartError),
}

/// Sends single requests to the daemon.
pub struct Client {
    connector: Box<dyn Connector>,
    starter: Option<Box<dyn DaemonStarter>>,
    timeout: Duration,
}

impl Client {
    /// Create a client with no autostart fallback.
    pub fn new(connector: Box<dyn Connector>, timeout: Duration) -> Self {
        Self {
            connector,
            starter: None,
            timeout,
        }
    }

    /// Start a daemon through `starter` when an `exec` finds nobody listening.
    pub fn with_autostart(mut self, starter: Box<dyn DaemonStarter>) -> Self {
        self.starter = Some(starter);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the daemon which topics it serves.
    pub async fn discover(&self) -> Result<Vec<ServiceTopic>, ConnectError> {
        tokio::time::timeout(self.timeout, self.connector.discover())
            .await
            .map_err(|_| ConnectError::NoResponse(self.timeout))?
    }

    /// Deliver `payload` under `topic`, as a single attempt.
    pub async fn send(&self, topic: Topic, payload: &str) -> Result<Delivery, SendError> {
        let connect = tokio::time::timeout(self.timeout, self.connector.connect(topic))
            .await
            .unwrap_or(Err(ConnectError::NoResponse(self.timeout)));
        let mut conversation = match connect {
            Ok(conversation) => conversation,
            Err(ConnectError::NoListener(path)) => return self.no_listener(topic, payload, path),
            Err(e) => return Err(e.into()),
        };

        let result = conversation.execute(payload.as_bytes(), self.timeout).await;
        conversation.disconnect().await;
        result?;
        Ok(Delivery::Acknowledged)
    }

    fn no_listener(&self, topic: Topic, payload: &str, path: PathBuf) -> Result<Delivery, SendError> {
        match topic {
            Topic::Exit => {
                info!("daemon is not running");
                Ok(Delivery::AlreadyStopped)
            }
            Topic::Exec => {
                let Some(starter) = &self.starter else {
                    return Err(ConnectError::NoListener(path).into());
                };
                let pid = starter.start(payload)?;
                info!(daemon_pid = pid, "started daemon with the command queued");
                Ok(Delivery::DaemonStarted { pid })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_connector_creation() {
        let connector = UnixConnector::new("/tmp/test-handoff.sock");
        assert_eq!(connector.socket_path(), std::path::Path::new("/tmp/test-handoff.sock"));
    }

    #[tokio::test]
    async fn test_silent_listener_is_no_response() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("silent.sock");
        // Bound but never accepted: the connect succeeds, negotiation stalls.
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let client = Client::new(Box::new(UnixConnector::new(&path)), Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_secs(3), client.send(Topic::Exec, "true"))
            .await
            .expect("send must give up on its own");
        let err = result.unwrap_err();
        assert!(matches!(err, SendError::Connect(ConnectError::NoResponse(_))));
        assert!(err.to_string().contains("no answer within 200ms"));

        let discovered = tokio::time::timeout(Duration::from_secs(3), client.discover())
            .await
            .expect("discover must give up on its own");
        assert!(matches!(discovered, Err(ConnectError::NoResponse(_))));
    }

    #[tokio::test]
    async fn test_missing_socket_is_no_listener() {
        let connector = UnixConnector::new("/tmp/nonexistent-handoff.sock");
        let result = connector.connect(Topic::Exec).await;
        assert!(matches!(result, Err(ConnectError::NoListener(_))));
    }

    #[tokio::test]
    async fn test_stale_socket_is_no_listener() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stale.sock");
        // Bind and drop: the file stays but nobody is listening.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());

        let result = UnixConnector::new(&path).connect(Topic::Exec).await;
        assert!(matches!(result, Err(ConnectError::NoListener(_))));
    }

    // ── Client protocol over a scripted connector ──────────────────────

    #[derive(Clone, Default)]
    struct Script {
        connect_error: Option<fn(PathBuf) -> ConnectError>,
        outcome: Option<fn() -> TransactError>,
        log: Arc<Mutex<Vec<String>>>,
    }

    struct ScriptedConnector(Script);

    struct ScriptedConversation {
        topic: Topic,
        script: Script,
    }

    impl Connector for ScriptedConnector {
        fn connect(&self, topic: Topic) -> BoxFuture<'_, Result<Box<dyn Conversation>, ConnectError>> {
            Box::pin(async move {
                self.0.log.lock().unwrap().push(format!("connect {topic}"));
                if let Some(make) = self.0.connect_error {
                    return Err(make(PathBuf::from("/tmp/scripted.sock")));
                }
                Ok(Box::new(ScriptedConversation {
                    topic,
                    script: self.0.clone(),
                }) as Box<dyn Conversation>)
            })
        }

        fn discover(&self) -> BoxFuture<'_, Result<Vec<ServiceTopic>, ConnectError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    impl Conversation for ScriptedConversation {
        fn topic(&self) -> Topic {
            self.topic
        }

        fn execute<'a>(
            &'a mut self,
            payload: &'a [u8],
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<(), TransactError>> {
            Box::pin(async move {
                let text = String::from_utf8_lossy(payload).into_owned();
                self.script.log.lock().unwrap().push(format!("execute {text}"));
                match self.script.outcome {
                    Some(make) => Err(make()),
                    None => Ok(()),
                }
            })
        }

        fn disconnect(self: Box<Self>) -> BoxFuture<'static, ()> {
            self.script.log.lock().unwrap().push("disconnect".to_string());
            Box::pin(async {})
        }
    }

    #[derive(Default)]
    struct RecordingStarter {
        started: Arc<Mutex<Vec<String>>>,
    }

    impl DaemonStarter for RecordingStarter {
        fn start(&self, pending: &str) -> Result<u32, AutostartError> {
            self.started.lock().unwrap().push(pending.to_string());
            Ok(4242)
        }
    }

    fn client(script: &Script) -> Client {
        Client::new(Box::new(ScriptedConnector(script.clone())), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_send_acknowledged_and_disconnected() {
        let script = Script::default();
        let delivery = client(&script).send(Topic::Exec, "ls -l").await.unwrap();
        assert_eq!(delivery, Delivery::Acknowledged);
        assert_eq!(
            *script.log.lock().unwrap(),
            ["connect exec", "execute ls -l", "disconnect"]
        );
    }

    #[tokio::test]
    async fn test_send_failure_still_disconnects() {
        let script = Script {
            outcome: Some(|| TransactError::TimedOut(Duration::from_secs(30))),
            ..Script::default()
        };
        let err = client(&script).send(Topic::Exec, "ls").await.unwrap_err();
        assert!(matches!(err, SendError::Transact(TransactError::TimedOut(_))));
        assert_eq!(script.log.lock().unwrap().last().unwrap(), "disconnect");
    }

    #[tokio::test]
    async fn test_exit_without_daemon_is_success() {
        let script = Script {
            connect_error: Some(ConnectError::NoListener),
            ..Script::default()
        };
        let starter = RecordingStarter::default();
        let started = starter.started.clone();
        let client = client(&script).with_autostart(Box::new(starter));

        let delivery = client.send(Topic::Exit, "").await.unwrap();
        assert_eq!(delivery, Delivery::AlreadyStopped);
        assert!(started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exec_without_daemon_starts_one() {
        let script = Script {
            connect_error: Some(ConnectError::NoListener),
            ..Script::default()
        };
        let starter = RecordingStarter::default();
        let started = starter.started.clone();
        let client = client(&script).with_autostart(Box::new(starter));

        let delivery = client.send(Topic::Exec, "ls \"my file.txt\"").await.unwrap();
        assert_eq!(delivery, Delivery::DaemonStarted { pid: 4242 });
        assert_eq!(*started.lock().unwrap(), ["ls \"my file.txt\""]);
    }

    #[tokio::test]
    async fn test_exec_without_daemon_or_autostart_fails() {
        let script = Script {
            connect_error: Some(ConnectError::NoListener),
            ..Script::default()
        };
        let err = client(&script).send(Topic::Exec, "ls").await.unwrap_err();
        assert!(matches!(err, SendError::Connect(ConnectError::NoListener(_))));
    }

    #[tokio::test]
    async fn test_other_connect_errors_are_not_retried() {
        let script = Script {
            connect_error: Some(|_| ConnectError::Rejected("exec".to_string())),
            ..Script::default()
        };
        let starter = RecordingStarter::default();
        let started = starter.started.clone();
        let client = client(&script).with_autostart(Box::new(starter));

        let err = client.send(Topic::Exec, "ls").await.unwrap_err();
        assert!(matches!(err, SendError::Connect(ConnectError::Rejected(_))));
        assert!(started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connect_and_timeout_messages_differ() {
        let rejected = ConnectError::Rejected("exec".to_string()).to_string();
        let timed_out = TransactError::TimedOut(Duration::from_secs(30)).to_string();
        assert!(rejected.contains("failed to establish connection"));
        assert!(timed_out.contains("did not respond within 30000ms"));
    }
}
