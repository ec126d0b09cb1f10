//! [`MessagePort`] – typed send/receive boundary for process-to-process
//! transports.
//!
//! The core never speaks a wire protocol directly. A transport (QNX
//! message passing, a DDS bridge, a WebSocket relay) implements this trait
//! and moves [`Frame`]s in and out of the process; [`LoopbackPort`] is the
//! in-process implementation backed by the [`TopicBus`], used by tests and
//! single-process deployments.

use crate::bus::{Frame, TopicBus};
use aegis_types::CoreError;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;

/// Typed transport endpoint.
#[async_trait]
pub trait MessagePort: Send + Sync {
    /// Send one frame to the remote side.
    async fn send(&self, frame: Frame) -> Result<(), CoreError>;

    /// Live stream of inbound frames. The stream ends when the transport
    /// closes; lagged receivers skip dropped frames and continue.
    async fn frames(&self) -> BoxStream<'static, Frame>;
}

/// In-process port that loops frames through a [`TopicBus`].
pub struct LoopbackPort {
    bus: TopicBus,
}

impl LoopbackPort {
    pub fn new(bus: TopicBus) -> Self {
        Self { bus }
    }

    /// The bus this port publishes into.
    pub fn bus(&self) -> &TopicBus {
        &self.bus
    }
}

#[async_trait]
impl MessagePort for LoopbackPort {
    async fn send(&self, frame: Frame) -> Result<(), CoreError> {
        self.bus.publish(frame).map(|_| ())
    }

    async fn frames(&self) -> BoxStream<'static, Frame> {
        let receiver = self.bus.subscribe();
        Box::pin(stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(frame) => return Some((frame, receiver)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "loopback port lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn send_reaches_bus_subscribers() {
        let bus = TopicBus::default();
        let mut rx = bus.subscribe();
        let port = LoopbackPort::new(bus.clone());

        let frame = Frame::speed(2.0);
        port.send(frame.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id, frame.id);
    }

    #[tokio::test]
    async fn frames_stream_yields_published_frames() {
        let bus = TopicBus::default();
        let port = LoopbackPort::new(bus.clone());

        let mut frames = port.frames().await;
        let frame = Frame::battery_voltage(11.9);
        bus.publish(frame.clone()).unwrap();

        let received = frames.next().await.unwrap();
        assert_eq!(received.id, frame.id);
    }

    #[tokio::test]
    async fn send_without_receivers_is_an_error() {
        let port = LoopbackPort::new(TopicBus::default());
        assert!(port.send(Frame::speed(0.0)).await.is_err());
    }
}
