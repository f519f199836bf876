//! Frame sources: local capture or remote frame server

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::BufReader,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    task,
};
use tracing::{debug, info, warn};

use super::protocol::{MAX_RESPONSE_LEN, Request, Response, read_message, write_message};
use crate::{
    capture::Frame,
    config::CaptureConfig,
    controller::VideoCapture,
    error::{CaptureError, CaptureResult},
};

/// Something that can be asked for the current frame
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grabs and returns the next frame, or `None` when there are no more
    async fn query_frame(&self) -> CaptureResult<Option<Frame>>;

    /// Like `query_frame`, at half width and half height
    async fn query_small_frame(&self) -> CaptureResult<Option<Frame>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Serves frames from a capture in this process
///
/// The capture's blocking calls run on tokio's blocking thread pool.
#[derive(Debug, Clone)]
pub struct LocalFrameSource {
    capture: Arc<VideoCapture>,
}

impl LocalFrameSource {
    pub fn new(capture: Arc<VideoCapture>) -> Self {
        Self { capture }
    }

    /// The wrapped capture
    pub fn capture(&self) -> &Arc<VideoCapture> {
        &self.capture
    }

    async fn run_blocking<F>(&self, query: F) -> CaptureResult<Option<Frame>>
    where
        F: FnOnce(&VideoCapture) -> CaptureResult<Option<Frame>> + Send + 'static,
    {
        let capture = Arc::clone(&self.capture);
        match task::spawn_blocking(move || query(&capture)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CaptureError::from_panic("frame query", e.into_panic())),
            Err(e) => Err(CaptureError::Panicked {
                context: "frame query".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl FrameSource for LocalFrameSource {
    async fn query_frame(&self) -> CaptureResult<Option<Frame>> {
        self.run_blocking(|capture| capture.query_frame()).await
    }

    async fn query_small_frame(&self) -> CaptureResult<Option<Frame>> {
        self.run_blocking(|capture| capture.query_small_frame()).await
    }

    fn describe(&self) -> String {
        format!("local {}", self.capture.source())
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Fetches frames from a [`FrameServer`](super::FrameServer) over TCP
///
/// Every round-trip is bounded by the configured remote timeout. After a
/// transport failure the connection is dropped and the next query dials
/// again.
pub struct RemoteFrameSource {
    address:    String,
    timeout:    Duration,
    connection: Mutex<Option<Connection>>,
}

impl RemoteFrameSource {
    /// Connects to a frame server
    ///
    /// # Errors
    ///
    /// - [`CaptureError::RemoteUnavailable`] if the server cannot be reached
    /// - [`CaptureError::CaptureTimeout`] if connecting takes longer than
    ///   `config.remote_timeout`
    pub async fn connect(address: impl Into<String>, config: &CaptureConfig) -> CaptureResult<Self> {
        let source = Self {
            address:    address.into(),
            timeout:    config.remote_timeout,
            connection: Mutex::new(None),
        };
        let connection = source.dial().await?;
        *source.connection.lock().await = Some(connection);
        info!("Connected to frame server at {}", source.address);
        Ok(source)
    }

    /// Address of the frame server
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn with_timeout<T>(&self, future: impl Future<Output = CaptureResult<T>>) -> CaptureResult<T> {
        tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| CaptureError::CaptureTimeout {
                duration_ms: self.timeout.as_millis() as u64,
            })?
    }

    async fn dial(&self) -> CaptureResult<Connection> {
        let stream = self
            .with_timeout(async {
                TcpStream::connect(&self.address)
                    .await
                    .map_err(|e| CaptureError::RemoteUnavailable {
                        address: self.address.clone(),
                        reason:  e.to_string(),
                    })
            })
            .await?;
        // Requests are tiny; don't let Nagle hold them back
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn request(&self, request: Request) -> CaptureResult<Option<Frame>> {
        let mut slot = self.connection.lock().await;
        let mut connection = match slot.take() {
            Some(connection) => connection,
            None => {
                debug!("Reconnecting to frame server at {}", self.address);
                self.dial().await?
            }
        };

        let exchange = self
            .with_timeout(async {
                write_message(&mut connection.writer, &request).await?;
                let mut line = Vec::new();
                read_message::<_, Response>(&mut connection.reader, &mut line, MAX_RESPONSE_LEN)
                    .await?
                    .ok_or_else(|| CaptureError::RemoteUnavailable {
                        address: self.address.clone(),
                        reason:  "connection closed by server".to_string(),
                    })
            })
            .await;

        match exchange {
            Ok(response) => {
                *slot = Some(connection);
                response.into_result()
            }
            Err(e) => {
                warn!("Frame request to {} failed: {}", self.address, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl FrameSource for RemoteFrameSource {
    async fn query_frame(&self) -> CaptureResult<Option<Frame>> {
        self.request(Request::QueryFrame).await
    }

    async fn query_small_frame(&self) -> CaptureResult<Option<Frame>> {
        self.request(Request::QuerySmallFrame).await
    }

    fn describe(&self) -> String {
        format!("remote {}", self.address)
    }
}

impl std::fmt::Debug for RemoteFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFrameSource")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish()
    }
}
