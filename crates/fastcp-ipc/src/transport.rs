//! TCP framing shared by the namenode and datanode clients.
//!
//! Each message is a `u32` little-endian length prefix followed by a
//! postcard-encoded payload. One connection carries strictly alternating
//! request/response frames.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use fastcp_rpc::RpcError;

/// Maximum frame size: 8 MB. Block lists of very large files dominate;
/// a frame beyond this indicates a corrupt or hostile peer.
pub(crate) const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// One established connection to a namenode or datanode endpoint.
pub(crate) struct Connection {
    endpoint: String,
    stream: TcpStream,
}

impl Connection {
    /// Dial an endpoint.
    pub(crate) async fn connect(endpoint: &str) -> Result<Self, RpcError> {
        debug!(endpoint, "opening rpc connection");
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| RpcError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        stream
            .set_nodelay(true)
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            stream,
        })
    }

    /// The `host:port` this connection is bound to.
    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one request frame and read the response frame.
    pub(crate) async fn call<Req, Resp>(&mut self, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.send(request).await?;
        self.recv().await
    }

    async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), RpcError> {
        let payload =
            postcard::to_allocvec(message).map_err(|e| RpcError::Codec(e.to_string()))?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(RpcError::Codec(format!(
                "frame of {} bytes exceeds limit of {MAX_FRAME_SIZE}",
                payload.len()
            )));
        }

        let mut frame = BytesMut::with_capacity(4 + payload.len());
        frame.put_u32_le(payload.len() as u32);
        frame.put_slice(&payload);
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn recv<T: DeserializeOwned>(&mut self) -> Result<T, RpcError> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(RpcError::Codec(format!(
                "peer announced a {len} byte frame, limit is {MAX_FRAME_SIZE}"
            )));
        }

        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        postcard::from_bytes(&payload).map_err(|e| RpcError::Codec(e.to_string()))
    }
}
