//! HTTP receiver for pushed comments.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::Filter;

use super::error::CallbackServerError;
use super::router::{EventRouter, NotificationPayload};

/// Path prefix under which relays post comments.
pub const COMMENTS_PATH: &str = "comments";

/// Upper bound for a single pushed body.
const MAX_BODY_BYTES: u64 = 64 * 1024;

const UNSPECIFIED: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Local HTTP endpoint that relays push comments to.
///
/// Serves `POST /comments/<stream-id>`. Bodies for stream IDs registered on
/// [`router`](Self::router) are forwarded to the channel given to
/// [`new`](Self::new); everything else is answered with an error status and
/// dropped.
///
/// ```no_run
/// use callback_server::{CallbackServer, NotificationPayload};
/// use tokio::sync::mpsc;
///
/// # async fn demo() -> Result<(), callback_server::CallbackServerError> {
/// let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
/// let server = CallbackServer::new((3400, 3500), tx).await?;
/// server.router().register("streamer".to_string()).await;
///
/// println!("relay to {}", server.comments_url("streamer"));
/// if let Some(comment) = rx.recv().await {
///     println!("{} -> {}", comment.stream_id, comment.body);
/// }
/// server.shutdown().await
/// # }
/// ```
pub struct CallbackServer {
    port: u16,
    base_url: String,
    router: Arc<EventRouter>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the first free port in `port_range` (inclusive) and start serving.
    ///
    /// Returns once the listener is bound, so the advertised URL is usable
    /// immediately.
    pub async fn new(
        port_range: (u16, u16),
        sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, CallbackServerError> {
        let (start, end) = port_range;
        let port = first_free_port(start..=end)
            .ok_or(CallbackServerError::NoAvailablePort { start, end })?;

        let host = outbound_ip().unwrap_or_else(|| {
            tracing::warn!("Could not determine outbound address, advertising loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        let base_url = format!("http://{host}:{port}");

        let router = Arc::new(EventRouter::new(sender));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let bound = warp::serve(comments_filter(router.clone()).recover(reject_to_status))
            .try_bind_with_graceful_shutdown(SocketAddr::new(UNSPECIFIED, port), async move {
                let _ = stop_rx.await;
            });

        let (addr, serving) = bound.map_err(|e| CallbackServerError::Startup(e.to_string()))?;
        let task = tokio::spawn(serving);

        tracing::info!("Comment receiver bound to {addr}, advertised as {base_url}");

        Ok(Self {
            port,
            base_url,
            router,
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }

    /// `http://<host>:<port>` as seen from the local network.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL relays post comments for `stream_id` to.
    pub fn comments_url(&self, stream_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, COMMENTS_PATH, stream_id)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) -> Result<(), CallbackServerError> {
        self.signal_stop();

        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| CallbackServerError::Startup(format!("server task failed: {e}")))?;
        }

        tracing::debug!("Comment receiver on port {} shut down", self.port);
        Ok(())
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        // Graceful shutdown still completes on the runtime if it is alive
        self.signal_stop();
    }
}

/// `POST /comments/<stream-id>` with a bounded, non-empty body.
fn comments_filter(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (StatusCode,), Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::path(COMMENTS_PATH))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and_then(move |stream_id: String, body: bytes::Bytes| {
            let router = router.clone();
            async move {
                if body.is_empty() {
                    return Err(warp::reject::custom(EmptyBody));
                }

                tracing::debug!("{} bytes pushed for {}", body.len(), stream_id);
                let body = String::from_utf8_lossy(&body).into_owned();

                if router.route_event(stream_id, body).await {
                    Ok(StatusCode::OK)
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
}

#[derive(Debug)]
struct EmptyBody;

impl warp::reject::Reject for EmptyBody {}

fn rejection_status(err: &warp::Rejection) -> (StatusCode, &'static str) {
    if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Stream not registered")
    } else if err.find::<EmptyBody>().is_some() {
        (StatusCode::BAD_REQUEST, "Empty body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Body too large")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Only POST is accepted")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

async fn reject_to_status(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (status, message) = rejection_status(&err);
    Ok(warp::reply::with_status(message, status))
}

fn first_free_port(range: RangeInclusive<u16>) -> Option<u16> {
    range.into_iter().find(|&port| port_is_free(port))
}

fn port_is_free(port: u16) -> bool {
    TcpListener::bind(SocketAddr::new(UNSPECIFIED, port)).is_ok()
}

/// Address of the interface used for outbound traffic. Connecting a UDP
/// socket sends nothing.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
