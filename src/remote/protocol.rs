//! JSON-lines messages exchanged between `RemoteFrameSource` and `FrameServer`

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    capture::Frame,
    error::{CaptureError, CaptureResult},
    util::encode::{decode_frame, encode_png},
};

/// Largest request line a server accepts
pub(crate) const MAX_REQUEST_LEN: usize = 4 * 1024;

/// Largest response line a client accepts; base64 PNG frames are big
pub(crate) const MAX_RESPONSE_LEN: usize = 64 * 1024 * 1024;

/// Request sent by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    QueryFrame,
    QuerySmallFrame,
}

/// Frame payload: PNG bytes, base64-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    pub width:  u32,
    pub height: u32,
    pub png:    String,
}

impl WireFrame {
    /// Encodes a frame for the wire
    pub fn encode(frame: &Frame) -> CaptureResult<Self> {
        let (width, height) = frame.dimensions();
        Ok(Self {
            width,
            height,
            png: STANDARD.encode(encode_png(frame)?),
        })
    }

    /// Decodes the payload and checks it against the advertised size
    pub fn decode(&self) -> CaptureResult<Frame> {
        let bytes = STANDARD
            .decode(&self.png)
            .map_err(|e| CaptureError::ProtocolError {
                reason: format!("invalid base64 frame payload: {e}"),
            })?;
        let frame = decode_frame(&bytes)?;
        if frame.dimensions() != (self.width, self.height) {
            let (width, height) = frame.dimensions();
            return Err(CaptureError::ProtocolError {
                reason: format!(
                    "frame is {width}x{height} but was advertised as {}x{}",
                    self.width, self.height
                ),
            });
        }
        Ok(frame)
    }
}

/// Response sent by the server
///
/// `Error` is listed first so that `{"error":...}` is not mistaken for a
/// frame response with a missing frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Error { error: String },
    Frame { frame: Option<WireFrame> },
}

impl Response {
    /// Builds the response for the outcome of a frame query
    pub fn from_result(result: CaptureResult<Option<Frame>>) -> Self {
        let encoded = result.and_then(|frame| frame.as_ref().map(WireFrame::encode).transpose());
        match encoded {
            Ok(frame) => Response::Frame { frame },
            Err(e) => Response::Error {
                error: e.to_string(),
            },
        }
    }

    /// Turns a response back into the outcome of the query
    pub fn into_result(self) -> CaptureResult<Option<Frame>> {
        match self {
            Response::Frame { frame } => frame.as_ref().map(WireFrame::decode).transpose(),
            Response::Error { error } => Err(CaptureError::RemoteError { message: error }),
        }
    }
}

/// Reads one message of at most `limit` bytes; `None` when the peer closed
/// the connection
///
/// Bytes accumulate in `line`, which the caller keeps across calls. The
/// future is cancel safe: dropping it leaves the partial line in `line` and
/// the next call picks up where it stopped. `line` is cleared once a message
/// has been consumed.
pub(crate) async fn read_message<R, T>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> CaptureResult<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    // Room for `limit` bytes of payload plus the newline
    let budget = (limit + 1).saturating_sub(line.len()) as u64;
    (&mut *reader).take(budget).read_until(b'\n', line).await?;

    if line.is_empty() {
        return Ok(None);
    }
    let result = if !line.ends_with(b"\n") && line.len() > limit {
        Err(CaptureError::MessageTooLarge { limit })
    } else {
        serde_json::from_slice(line)
            .map(Some)
            .map_err(|e| CaptureError::ProtocolError {
                reason: format!("malformed message: {e}"),
            })
    };
    line.clear();
    result
}

/// Writes one message followed by a newline
pub(crate) async fn write_message<W, T>(writer: &mut W, message: &T) -> CaptureResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message).map_err(|e| CaptureError::ProtocolError {
        reason: format!("failed to serialize message: {e}"),
    })?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
