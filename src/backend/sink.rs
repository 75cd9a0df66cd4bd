//! Writes a backend response back to the router as v3 frames.
//!
//! ```text
//! HEADER  [END_HEADER | END_STREAM?]  "HTTP/1.1 200 OK\nname:value\n"
//! DATA    []                          chunk (waits on the flow window)
//! DATA    [END_STREAM]                empty
//! ```
//! A failed forward sends `RST_STREAM` instead.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::backend::forwarder::{ForwardError, ForwardResult};
use crate::net::transport::Transport;
use crate::observability::metrics;
use crate::protocol::close_code;
use crate::protocol::frame::BinaryFrame;
use crate::protocol::listener::{observe, ProxyEventListener, SocketInfo};
use crate::protocol::message_type::{flags, MessageType};
use crate::protocol::stream::StreamControl;

/// Response side of one forwarded request.
#[derive(Clone)]
pub struct ResponseSink {
    transport: Arc<dyn Transport>,
    stream: Arc<StreamControl>,
    socket: SocketInfo,
    events: Arc<dyn ProxyEventListener>,
}

impl ResponseSink {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        stream: Arc<StreamControl>,
        socket: SocketInfo,
        events: Arc<dyn ProxyEventListener>,
    ) -> Self {
        Self {
            transport,
            stream,
            socket,
            events,
        }
    }

    /// Request id the response is written under.
    pub fn request_id(&self) -> u32 {
        self.stream.request_id()
    }

    /// Send the status line and headers. `end_stream` marks a response without body.
    pub fn send_head(
        &self,
        status: u16,
        reason: &str,
        headers: &[(String, String)],
        end_stream: bool,
    ) -> ForwardResult<()> {
        if self.stream.is_cancelled() {
            return Err(ForwardError::Cancelled);
        }
        if !self.stream.mark_head_sent() {
            return Err(ForwardError::InvalidRequest(
                "response head already sent".to_string(),
            ));
        }

        let mut text = format!("HTTP/1.1 {} {}\n", status, reason);
        for (name, value) in headers {
            text.push_str(name);
            text.push(':');
            text.push_str(value);
            text.push('\n');
        }

        let mut frame_flags = flags::END_HEADER;
        if end_stream {
            frame_flags |= flags::END_STREAM;
            self.stream.mark_finished();
        }
        self.transport.send_binary(BinaryFrame::encode(
            MessageType::Header,
            frame_flags,
            self.request_id(),
            text.as_bytes(),
        ));

        observe(
            &self.socket,
            "response_started",
            self.events.on_response_started(&self.socket, status),
        );
        Ok(())
    }

    /// Send one body chunk, waiting for the router to acknowledge earlier bytes if needed.
    pub async fn send_chunk(&self, chunk: Bytes) -> ForwardResult<()> {
        if !self.stream.head_sent() || self.stream.is_finished() {
            return Err(ForwardError::InvalidRequest(
                "body chunk outside of an open response".to_string(),
            ));
        }
        if !self.stream.window().wait_for_capacity().await {
            return Err(ForwardError::Cancelled);
        }

        self.stream.window().record_sent(chunk.len());
        metrics::record_body_bytes("response", chunk.len());
        self.transport.send_binary(BinaryFrame::encode(
            MessageType::Data,
            0,
            self.request_id(),
            &chunk,
        ));
        Ok(())
    }

    /// Mark the end of the response body.
    pub fn finish(&self) -> ForwardResult<()> {
        if self.stream.is_cancelled() {
            return Err(ForwardError::Cancelled);
        }
        if self.stream.mark_finished() {
            self.transport.send_binary(BinaryFrame::encode(
                MessageType::Data,
                flags::END_STREAM,
                self.request_id(),
                &[],
            ));
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }

    pub fn head_sent(&self) -> bool {
        self.stream.head_sent()
    }

    /// Abort the stream towards the router.
    pub(crate) fn reset(&self, message: &str) {
        if self.stream.is_cancelled() || !self.stream.mark_finished() {
            return;
        }
        let mut payload = BytesMut::with_capacity(4 + message.len());
        payload.put_u32(u32::from(close_code::INTERNAL_ERROR));
        payload.put_slice(message.as_bytes());
        self.transport.send_binary(BinaryFrame::encode(
            MessageType::RstStream,
            flags::END_STREAM,
            self.request_id(),
            &payload,
        ));
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("socket", &self.socket.id)
            .field("request_id", &self.request_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::listener::NoopEvents;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<Bytes>>);

    impl Transport for Captured {
        fn send_text(&self, _text: String) {}
        fn send_binary(&self, data: Bytes) {
            self.0.lock().unwrap().push(data);
        }
        fn send_ping(&self, _payload: Bytes) {}
        fn send_pong(&self, _payload: Bytes) {}
        fn send_close(&self, _code: u16, _reason: &str) {}
        fn request(&self, _n: u64) {}
        fn abort(&self) {}
    }

    fn sink(watermark: usize) -> (ResponseSink, Arc<Captured>, Arc<StreamControl>) {
        let transport = Arc::new(Captured::default());
        let stream = Arc::new(StreamControl::new(Some(3), watermark));
        let sink = ResponseSink::new(
            transport.clone(),
            stream.clone(),
            SocketInfo::new("ws://router"),
            Arc::new(NoopEvents),
        );
        (sink, transport, stream)
    }

    fn decoded(transport: &Captured) -> Vec<BinaryFrame> {
        transport
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|b| BinaryFrame::decode(b.clone()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_head_chunks_and_end() {
        let (sink, transport, _) = sink(1024);
        sink.send_head(200, "OK", &[("X-A".into(), "1".into())], false)
            .unwrap();
        sink.send_chunk(Bytes::from_static(b"hello")).await.unwrap();
        sink.finish().unwrap();
        sink.finish().unwrap();

        let frames = decoded(&transport);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].message_type, MessageType::Header.code());
        assert!(frames[0].is_end_header());
        assert!(!frames[0].is_end_stream());
        assert_eq!(&frames[0].payload[..], b"HTTP/1.1 200 OK\nX-A:1\n");
        assert_eq!(frames[1].request_id, 3);
        assert_eq!(&frames[1].payload[..], b"hello");
        assert!(frames[2].is_end_stream());
        assert!(frames[2].payload.is_empty());
    }

    #[tokio::test]
    async fn empty_response_ends_with_head() {
        let (sink, transport, _) = sink(1024);
        sink.send_head(204, "No Content", &[], true).unwrap();
        sink.finish().unwrap();

        let frames = decoded(&transport);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].flags, flags::END_HEADER | flags::END_STREAM);
    }

    #[tokio::test]
    async fn reset_sends_rst_once() {
        let (sink, transport, _) = sink(1024);
        sink.reset("Upstream error: refused");
        sink.reset("again");

        let frames = decoded(&transport);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_type, MessageType::RstStream.code());
        assert_eq!(&frames[0].payload[..4], &[0, 0, 0x03, 0xF3]);
        assert_eq!(&frames[0].payload[4..], b"Upstream error: refused");
    }

    #[tokio::test]
    async fn cancelled_stream_refuses_chunks() {
        let (sink, _, stream) = sink(4);
        sink.send_head(200, "OK", &[], false).unwrap();
        sink.send_chunk(Bytes::from_static(b"12345")).await.unwrap();
        stream.cancel();
        assert!(matches!(
            sink.send_chunk(Bytes::from_static(b"6")).await,
            Err(ForwardError::Cancelled)
        ));
    }
}
