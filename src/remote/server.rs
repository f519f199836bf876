//! TCP frame server

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::watch,
};
use tracing::{debug, info, warn};

use super::{
    protocol::{MAX_REQUEST_LEN, Request, Response, read_message, write_message},
    source::FrameSource,
};
use crate::error::{CaptureError, CaptureResult};

/// Serves frames from any [`FrameSource`] to [`RemoteFrameSource`](super::RemoteFrameSource)
/// clients
///
/// Each connection is handled by its own task. Requests on one connection
/// are answered in order.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use framegrab::{
///     capture::MockBackend,
///     controller::VideoCapture,
///     remote::{FrameServer, LocalFrameSource},
/// };
/// use tokio::sync::watch;
///
/// # async fn example() -> framegrab::error::CaptureResult<()> {
/// let capture = VideoCapture::from_device(&MockBackend::new(), 0)?;
/// let source = Arc::new(LocalFrameSource::new(Arc::new(capture)));
///
/// let server = FrameServer::bind("127.0.0.1:7878", source).await?;
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let task = tokio::spawn(server.run(shutdown_rx));
///
/// // ...
/// shutdown_tx.send(true).ok();
/// task.await.ok();
/// # Ok(())
/// # }
/// ```
pub struct FrameServer {
    listener: TcpListener,
    source:   Arc<dyn FrameSource>,
}

impl FrameServer {
    /// Binds the listening socket
    pub async fn bind(addr: impl ToSocketAddrs, source: Arc<dyn FrameSource>) -> CaptureResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, source })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> CaptureResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` turns `true` or its sender is
    /// dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> CaptureResult<()> {
        let addr = self.local_addr()?;
        info!("Frame server listening on {} for {}", addr, self.source.describe());

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Frame client connected: {}", peer);
                        let source = Arc::clone(&self.source);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            match serve_connection(stream, source, shutdown).await {
                                Ok(()) => debug!("Frame client disconnected: {}", peer),
                                Err(e) => warn!("Frame client {} failed: {}", peer, e),
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept frame client: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Frame server on {} shut down", addr);
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    source: Arc<dyn FrameSource>,
    mut shutdown: watch::Receiver<bool>,
) -> CaptureResult<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    // Outlives each select! so a partly received request survives wakeups
    let mut line = Vec::new();

    loop {
        let message = tokio::select! {
            message = read_message::<_, Request>(&mut reader, &mut line, MAX_REQUEST_LEN) => message,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        };

        let response = match message {
            Ok(Some(request)) => answer(source.as_ref(), request).await,
            Ok(None) => return Ok(()),
            // Keep the connection; the client may send a valid request next
            Err(CaptureError::ProtocolError { reason }) => Response::Error { error: reason },
            Err(e @ CaptureError::MessageTooLarge { .. }) => {
                // No way to find the next message boundary; report and hang up
                let response = Response::Error {
                    error: e.to_string(),
                };
                write_message(&mut writer, &response).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        write_message(&mut writer, &response).await?;
    }
}

async fn answer(source: &dyn FrameSource, request: Request) -> Response {
    let result = match request {
        Request::QueryFrame => source.query_frame().await,
        Request::QuerySmallFrame => source.query_small_frame().await,
    };
    if let Err(e) = &result {
        warn!("Frame query {:?} failed: {}", request, e);
    }
    Response::from_result(result)
}

impl std::fmt::Debug for FrameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("source", &self.source.describe())
            .finish()
    }
}
