//! Transports behind the [`Connector`](crate::connection::Connector) seam.
//!
//! | Transport              | Feature     | Use                                  |
//! |------------------------|-------------|--------------------------------------|
//! | [`WebSocketConnector`] | `transport` | real channel server over `ws://`     |
//! | [`MemoryConnector`]    | always      | tests and tooling, no sockets        |

pub mod memory;
#[cfg(feature = "transport")]
pub mod websocket;

pub use memory::MemoryConnector;
#[cfg(feature = "transport")]
pub use websocket::WebSocketConnector;
