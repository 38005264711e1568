//! Message transports carried by the relay
//!
//! A transport is a full-duplex channel of discrete text messages, in
//! practice a WebSocket. The client side uses a `tokio-tungstenite` stream,
//! the server side an upgraded axum socket; both are adapted to the same
//! pair of traits here so the relay engine is written once.

use async_trait::async_trait;
use axum::extract::ws::{self as axum_ws, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close frame without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the transport
    #[error("transport closed with code {code}")]
    Closed {
        /// Close code, [`CLOSE_NO_STATUS`] or [`CLOSE_ABNORMAL`] when the
        /// peer did not send one
        code: u16,
    },

    /// A message type the relay does not carry
    #[error("unsupported frame type: {0}")]
    UnsupportedFrame(&'static str),

    /// Outbound payload is not valid UTF-8 and cannot go in a text message
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// Underlying I/O or protocol error
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether this is a close that ends the relay session cleanly
    ///
    /// Every close code counts, except "going away" and "abnormal closure".
    pub fn is_graceful_close(&self) -> bool {
        match self {
            TransportError::Closed { code } => *code != CLOSE_GOING_AWAY && *code != CLOSE_ABNORMAL,
            _ => false,
        }
    }
}

/// Receiving half of a transport
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Wait for the next text message
    ///
    /// Control frames are handled below this layer and never returned.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;
}

/// Sending half of a transport
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Send `payload` as one text message
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Start closing the transport with `code`
    ///
    /// [`CLOSE_NORMAL`] tells the peer the session ended cleanly,
    /// [`CLOSE_GOING_AWAY`] that it failed on this side.
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}

/// A message transport that can be split into independent halves
pub trait MessageTransport: Send + 'static {
    /// Sending half
    type Sink: MessageSink;
    /// Receiving half
    type Source: MessageSource;

    /// Separate the two directions
    fn split(self) -> (Self::Sink, Self::Source);
}

fn to_text(payload: &[u8]) -> Result<String, TransportError> {
    String::from_utf8(payload.to_vec()).map_err(|_| TransportError::InvalidUtf8)
}

/// Sending half of a `tokio-tungstenite` stream
pub struct TungsteniteSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

/// Receiving half of a `tokio-tungstenite` stream
pub struct TungsteniteSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

fn from_tungstenite(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed { code: CLOSE_NO_STATUS },
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::Closed { code: CLOSE_ABNORMAL }
        }
        other => TransportError::Io(other.to_string()),
    }
}

impl<S> MessageTransport for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sink = TungsteniteSink<S>;
    type Source = TungsteniteSource<S>;

    fn split(self) -> (Self::Sink, Self::Source) {
        let (sink, stream) = StreamExt::split(self);
        (TungsteniteSink { inner: sink }, TungsteniteSource { inner: stream })
    }
}

#[async_trait]
impl<S> MessageSource for TungsteniteSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Bytes::copy_from_slice(text.as_bytes())),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(CLOSE_NO_STATUS);
                    return Err(TransportError::Closed { code });
                }
                Some(Ok(Message::Binary(_))) => return Err(TransportError::UnsupportedFrame("binary")),
                Some(Ok(Message::Frame(_))) => return Err(TransportError::UnsupportedFrame("raw")),
                Some(Err(e)) => return Err(from_tungstenite(e)),
                None => return Err(TransportError::Closed { code: CLOSE_ABNORMAL }),
            }
        }
    }
}

#[async_trait]
impl<S> MessageSink for TungsteniteSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let text = to_text(payload)?;
        self.inner.send(Message::text(text)).await.map_err(from_tungstenite)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        match self.inner.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(from_tungstenite(e)),
        }
    }
}

/// Sending half of an upgraded axum socket
pub struct AxumSink {
    inner: SplitSink<WebSocket, axum_ws::Message>,
}

/// Receiving half of an upgraded axum socket
pub struct AxumSource {
    inner: SplitStream<WebSocket>,
}

impl MessageTransport for WebSocket {
    type Sink = AxumSink;
    type Source = AxumSource;

    fn split(self) -> (Self::Sink, Self::Source) {
        let (sink, stream) = StreamExt::split(self);
        (AxumSink { inner: sink }, AxumSource { inner: stream })
    }
}

#[async_trait]
impl MessageSource for AxumSource {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(axum_ws::Message::Text(text))) => return Ok(Bytes::from(text)),
                Some(Ok(axum_ws::Message::Ping(_))) | Some(Ok(axum_ws::Message::Pong(_))) => continue,
                Some(Ok(axum_ws::Message::Close(frame))) => {
                    let code = frame.map(|f| f.code).unwrap_or(CLOSE_NO_STATUS);
                    return Err(TransportError::Closed { code });
                }
                Some(Ok(axum_ws::Message::Binary(_))) => return Err(TransportError::UnsupportedFrame("binary")),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                None => return Err(TransportError::Closed { code: CLOSE_ABNORMAL }),
            }
        }
    }
}

#[async_trait]
impl MessageSink for AxumSink {
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let text = to_text(payload)?;
        self.inner
            .send(axum_ws::Message::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = axum_ws::CloseFrame {
            code,
            reason: Cow::Borrowed(""),
        };
        self.inner
            .send(axum_ws::Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
