//! Handles one client connection end to end: requests come in over the
//! framed socket, get dispatched, and their responses go back out the same
//! way. A successful `Subscribe` additionally starts forwarding `StreamEvent`s
//! on the same connection until the stream reaches its terminal event.

use crate::dispatch::{handle_client_request, NonStreamingRequest};
use crate::state::ServerState;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tpar_base::{ClientRequest, ClientResponse, StreamEvent};
use tpar_net::split_framed;
use tpar_subpub::Event;
use tracing::{debug, warn};

pub async fn run(state: Arc<ServerState>, stream: TcpStream, peer: std::net::SocketAddr) {
    let (mut reader, mut writer) = split_framed::<ClientRequest, ClientResponse>(stream);

    loop {
        let request = match reader.next().await {
            Some(Ok(request)) => request,
            Some(Err(err)) => {
                warn!(%peer, %err, "client connection framing error");
                return;
            }
            None => {
                debug!(%peer, "client disconnected");
                return;
            }
        };

        match request {
            ClientRequest::Subscribe(stream_id) => {
                match state.subscribe(stream_id).await {
                    Some(events) => {
                        if writer.send(ClientResponse::SubscribeAck).await.is_err() {
                            return;
                        }
                        if forward_stream_events(&mut writer, events).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        if writer
                            .send(ClientResponse::SubscribeAlreadyTerminated)
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            other => {
                let non_streaming = match other {
                    ClientRequest::Enqueue(req) => NonStreamingRequest::Enqueue(req),
                    ClientRequest::Status(filter) => NonStreamingRequest::Status(filter),
                    ClientRequest::Kill(filter) => NonStreamingRequest::Kill(filter),
                    ClientRequest::Rerun(filter) => NonStreamingRequest::Rerun(filter),
                    ClientRequest::Subscribe(_) => unreachable!("handled above"),
                };
                let response = handle_client_request(&state, non_streaming).await;
                if writer.send(response).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn forward_stream_events(
    writer: &mut tpar_net::FrameWriter<ClientResponse>,
    mut events: crate::state::JobStreamEvents,
) -> Result<(), tpar_net::FrameError> {
    while let Some(event) = events.next().await {
        let stream_event = match event {
            Event::Item(chunk) => StreamEvent::Chunk(chunk),
            Event::Done(exit_status) => StreamEvent::Done(exit_status),
            Event::Failed(message) => StreamEvent::Failed(message),
        };
        writer
            .send(ClientResponse::StreamMessage(stream_event))
            .await?;
    }
    Ok(())
}
