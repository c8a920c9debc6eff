//! The `transport` module exposes the broker over the network.
//!
//! It defines the request/response protocol used between clients and the
//! broker, and implements the WebSocket server that decodes each request
//! frame, applies it to the shared broker and writes back one response frame.

pub mod message;
pub mod websocket;

pub use message::{Request, Response};
pub use websocket::{handle_request, serve, start_websocket_server};
