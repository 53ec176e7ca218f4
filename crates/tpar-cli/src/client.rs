//! A thin client-side connection helper: connect, send one `ClientRequest`,
//! read back the matching `ClientResponse` (and, for `Subscribe`, the
//! `StreamMessage`s that follow it on the same connection).

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tpar_base::{ClientRequest, ClientResponse, StreamEvent};
use tpar_net::{split_framed, FrameReader, FrameWriter};

pub struct ServerConn {
    reader: FrameReader<ClientResponse>,
    writer: FrameWriter<ClientRequest>,
}

impl ServerConn {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await.with_context(|| {
            format!("failed to connect to tpar server at {host}:{port} — is it running?")
        })?;
        let (reader, writer) = split_framed(stream);
        Ok(ServerConn { reader, writer })
    }

    pub async fn call(&mut self, request: ClientRequest) -> Result<ClientResponse> {
        self.writer
            .send(request)
            .await
            .context("failed to send request to server")?;
        self.reader
            .next()
            .await
            .context("connection closed before a response arrived")?
            .context("failed to decode server response")
    }

    /// Reads the next `StreamEvent` pushed on this connection after a
    /// successful `Subscribe`. Callers loop on this until they see a
    /// `Done`/`Failed` event.
    pub async fn next_stream_event(&mut self) -> Result<StreamEvent> {
        let response = self
            .reader
            .next()
            .await
            .context("connection closed mid-stream")?
            .context("failed to decode server response")?;
        match response {
            ClientResponse::StreamMessage(event) => Ok(event),
            other => bail!("expected a stream message, got {other:?}"),
        }
    }
}
