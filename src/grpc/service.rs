use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use crate::consts::STREAM_CHANNEL_CAPACITY;
use crate::grpc::proto::mavlink_bridge_server::MavlinkBridge;
use crate::grpc::proto::{MavlinkMessage, SendResponse, StreamFilter};
use crate::prelude::*;
use crate::router::Router;

/// Callback that pushes a submitted message into the MAVLink link.
///
/// Installed by the bridge coordinator; converts to wire form and sends
/// through the protocol engine.
pub type SendHandler = Arc<dyn Fn(&MavlinkMessage) -> Result<()> + Send + Sync>;

/// Implementation of the `MavlinkBridge` gRPC service.
pub struct BridgeService {
    router: Arc<Router>,
    send_handler: SendHandler,
}

impl BridgeService {
    /// Creates a service over `router`, submitting outbound messages to
    /// `send_handler`.
    pub fn new(router: Arc<Router>, send_handler: SendHandler) -> Self {
        Self {
            router,
            send_handler,
        }
    }
}

#[tonic::async_trait]
impl MavlinkBridge for BridgeService {
    type StreamMessagesStream = SubscriptionStream;

    async fn stream_messages(
        &self,
        request: Request<StreamFilter>,
    ) -> std::result::Result<Response<Self::StreamMessagesStream>, Status> {
        let filter = request.into_inner();
        log::info!(
            "grpc: client connected (sys: {}, comp: {}, msgs: {})",
            filter.system_id,
            filter.component_id,
            filter.message_ids.len()
        );

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        // The writer runs on the engine's receive thread inside the router
        // lock; try_send keeps it non-blocking. A closed or full channel
        // reads as a failed subscriber and gets the subscription evicted.
        let id = self.router.subscribe(
            filter,
            Box::new(move |message: &MavlinkMessage| tx.try_send(Ok(message.clone())).is_ok()),
        );

        Ok(Response::new(SubscriptionStream {
            inner: ReceiverStream::new(rx),
            router: self.router.clone(),
            id,
        }))
    }

    async fn send_message(
        &self,
        request: Request<MavlinkMessage>,
    ) -> std::result::Result<Response<SendResponse>, Status> {
        let message = request.into_inner();

        if message.payload.is_none() {
            log::warn!("grpc: send rejected: message has no payload");
            return Err(Status::invalid_argument("message has no payload"));
        }

        match (self.send_handler)(&message) {
            Ok(()) => {
                log::debug!(
                    "grpc: sent message (id: {}, sys: {}, comp: {})",
                    message.message_id,
                    message.system_id,
                    message.component_id
                );
                Ok(Response::new(SendResponse {
                    success: true,
                    error: String::new(),
                }))
            }
            Err(err) => {
                log::error!("grpc: failed to send message (id: {}): {err}", message.message_id);
                Err(Status::internal(format!("MAVLink send failed: {err}")))
            }
        }
    }
}

/// Response stream of one `StreamMessages` call.
///
/// Wraps the subscription's delivery channel; dropping the stream (client
/// disconnect, call cancellation, or server shutdown) unsubscribes from the
/// router, so stream lifetime and subscription lifetime coincide without
/// any polling.
pub struct SubscriptionStream {
    inner: ReceiverStream<std::result::Result<MavlinkMessage, Status>>,
    router: Arc<Router>,
    id: u64,
}

impl Stream for SubscriptionStream {
    type Item = std::result::Result<MavlinkMessage, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.router.unsubscribe(self.id);
        log::info!("grpc: client disconnected (id: {})", self.id);
    }
}
