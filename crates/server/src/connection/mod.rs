//! Capabilities the server core consumes.
//!
//! The accept loop only ever talks to these traits, so the transport, the
//! protocol framing and TLS can all be swapped independently:
//!
//! - [`Listener`]: yields raw connections together with their [`ConnectionInfo`]
//! - [`Upgrade`]: turns a raw connection into a [`MultiplexedConnection`]
//! - [`MultiplexedConnection`]: yields [`RequestEvent`]s until the peer is done
//! - [`ResponseSink`]: writes exactly one response for one request
//! - [`Close`]: idempotent-aware teardown shared by listeners and connections
//!
//! [`TcpListener`] and [`BindOptions`] provide the plain TCP binding used by
//! `Server::listen_and_serve`; [`TlsBind`] is the seam for TLS listeners.

mod info;
mod listener;
mod multiplexed;
mod tcp;
mod tls;
mod upgrade;

pub use info::ConnectionInfo;
pub use listener::Close;
pub use listener::Listener;
pub use multiplexed::MultiplexedConnection;
pub use multiplexed::RequestEvent;
pub use multiplexed::ResponseSink;
pub use tcp::BindOptions;
pub use tcp::TcpListener;
pub use tls::CertInfo;
pub use tls::TlsBind;
pub use upgrade::Upgrade;
