//! The server facade and its lifecycle.
//!
//! A [`Server`] is `OPEN` until [`Server::close`] is called, after which it is
//! `CLOSED` for good. While open, any number of listeners can be served
//! concurrently; each one gets its own accept loop:
//!
//! ```text
//! serve(listener)
//!   └─ accept loop ── accept ──> spawn connection task ─┐
//!        │  transient error: backoff (cancelled by close)│
//!        │  fatal error: return it                       ▼
//!        └─ listener closed: return       upgrade ─> multiplex ─> spawn responder per request
//! ```
//!
//! Nothing spawned is awaited by the loop that spawned it, so a slow upgrade
//! or a slow handler never delays accepting or reading. `close` returns
//! immediately; call [`Server::drained`] afterwards to wait for stragglers.
//!
//! # Example
//!
//! ```ignore
//! async fn hello(_req: Request<String>, info: ConnectionInfo) -> Result<Response<String>, BoxError> {
//!     Ok(Response::new(format!("hello {}", info.remote_addr())))
//! }
//!
//! // `upgrade` turns a `TcpStream` into some `MultiplexedConnection`
//! let server = Server::new(make_handler(hello), upgrade);
//!
//! let closer = server.clone();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     closer.close().ok();
//! });
//!
//! server.listen_and_serve(BindOptions::resolve("127.0.0.1:8080")?).await?;
//! server.drained().await;
//! ```

mod accept_loop;
mod multiplexer;
mod responder;

pub use accept_loop::is_transient_accept_error;

use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::backoff::Backoff;
use crate::connection::{BindOptions, CertInfo, Listener, MultiplexedConnection, TcpListener, TlsBind, Upgrade};
use crate::ensure;
use crate::error::ServerError;
use crate::handler::{DefaultErrorHandler, ErrorHandler, Handler};
use crate::registry::ConnectionRegistry;

/// State shared between the facade and every task it spawned.
pub(crate) struct Shared<H: Handler, U> {
    pub(crate) handler: H,
    pub(crate) on_error: Box<dyn ErrorHandler<H::RespBody>>,
    pub(crate) upgrade: U,
    pub(crate) backoff: Backoff,
    pub(crate) limit: Option<Arc<Semaphore>>,
    pub(crate) closed: AtomicBool,
    pub(crate) shutdown: CancellationToken,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) tasks: TaskTracker,
}

impl<H: Handler, U> Shared<H, U> {
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Configures a [`Server`] before it starts serving.
///
/// Without [`ServerBuilder::on_error`] the [`DefaultErrorHandler`] is used,
/// which requires the response body to implement `Default`.
pub struct ServerBuilder<H, U, E = DefaultErrorHandler> {
    handler: H,
    upgrade: U,
    on_error: E,
    initial_backoff: Duration,
    max_backoff: Duration,
    max_concurrent_requests: Option<NonZeroUsize>,
}

impl<H, U, E> ServerBuilder<H, U, E>
where
    H: Handler,
    U: Send + Sync + 'static,
{
    pub fn on_error<E2: ErrorHandler<H::RespBody>>(self, on_error: E2) -> ServerBuilder<H, U, E2> {
        ServerBuilder {
            handler: self.handler,
            upgrade: self.upgrade,
            on_error,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            max_concurrent_requests: self.max_concurrent_requests,
        }
    }

    /// The wait after the first transient accept failure.
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// The cap the doubling backoff never exceeds.
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Limits the number of in-flight responders across the whole server.
    ///
    /// Unlimited by default, and a limit of `0` also means unlimited. When the
    /// limit is reached, a request that was already read waits for a permit
    /// and its connection reads nothing more until a responder finishes.
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = NonZeroUsize::new(limit);
        self
    }

    pub fn build(self) -> Server<H, U>
    where
        E: ErrorHandler<H::RespBody>,
    {
        let shared = Shared {
            handler: self.handler,
            on_error: Box::new(self.on_error),
            upgrade: self.upgrade,
            backoff: Backoff::new(self.initial_backoff, self.max_backoff),
            limit: self.max_concurrent_requests.map(|limit| Arc::new(Semaphore::new(limit.get()))),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            registry: ConnectionRegistry::new(),
            tasks: TaskTracker::new(),
        };
        Server { shared: Arc::new(shared) }
    }
}

impl<H, U, E> Debug for ServerBuilder<H, U, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .finish_non_exhaustive()
    }
}

/// Accepts connections on any number of listeners and answers their requests.
///
/// `Server` is a cheap handle; clones share the same state, so one clone can
/// be serving while another one closes it.
pub struct Server<H: Handler, U> {
    shared: Arc<Shared<H, U>>,
}

impl<H: Handler, U> Clone for Server<H, U> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<H, U> Server<H, U>
where
    H: Handler,
    U: Send + Sync + 'static,
{
    pub fn builder(handler: H, upgrade: U) -> ServerBuilder<H, U> {
        let backoff = Backoff::default();
        ServerBuilder {
            handler,
            upgrade,
            on_error: DefaultErrorHandler,
            initial_backoff: backoff.initial(),
            max_backoff: backoff.max(),
            max_concurrent_requests: None,
        }
    }

    /// Creates a server with default settings and the [`DefaultErrorHandler`].
    pub fn new(handler: H, upgrade: U) -> Self
    where
        H::RespBody: Default,
    {
        Self::builder(handler, upgrade).build()
    }

    /// Serves `listener` until it is closed, the server is closed, or a fatal
    /// accept error happens, which is returned.
    ///
    /// The listener is untracked and closed whenever this returns.
    pub async fn serve<L>(&self, listener: L) -> Result<(), ServerError>
    where
        L: Listener,
        U: Upgrade<L::Conn>,
        <U as Upgrade<L::Conn>>::Output: MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
    {
        ensure!(!self.closed(), ServerError::Closed);
        accept_loop::accept_loop(&self.shared, listener).await
    }

    /// Binds a plain TCP listener and serves it.
    pub async fn listen_and_serve(&self, options: BindOptions) -> Result<(), ServerError>
    where
        U: Upgrade<TcpStream>,
        <U as Upgrade<TcpStream>>::Output: MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
    {
        ensure!(!self.closed(), ServerError::Closed);
        let listener = TcpListener::bind(&options).await.map_err(ServerError::bind)?;
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "bind tcp listener");
        }
        self.serve(listener).await
    }

    /// Binds a TLS listener through `tls` and serves it.
    pub async fn listen_and_serve_tls<T>(&self, options: BindOptions, cert: CertInfo, tls: &T) -> Result<(), ServerError>
    where
        T: TlsBind,
        U: Upgrade<<T::Listener as Listener>::Conn>,
        <U as Upgrade<<T::Listener as Listener>::Conn>>::Output:
            MultiplexedConnection<ReqBody = H::ReqBody, RespBody = H::RespBody>,
    {
        ensure!(!self.closed(), ServerError::Closed);
        let listener = tls.bind_tls(&options, &cert).await.map_err(ServerError::bind)?;
        info!(addr = %options.addr(), cert = %cert.cert_path().display(), "bind tls listener");
        self.serve(listener).await
    }

    /// Stops accepting, wakes every accept loop sleeping in backoff and closes
    /// every tracked listener and connection.
    ///
    /// In-flight responders are not cancelled; they finish or fail on write.
    pub fn close(&self) -> Result<(), ServerError> {
        ensure!(!self.shared.closed.swap(true, Ordering::AcqRel), ServerError::Closed);

        self.shared.shutdown.cancel();
        self.shared.registry.close_all();
        self.shared.tasks.close();
        info!("server closed");
        Ok(())
    }

    /// Waits until every connection and responder task has finished.
    ///
    /// Only resolves after [`Server::close`] has been called.
    pub async fn drained(&self) {
        self.shared.tasks.wait().await;
    }

    pub fn closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The bound addresses of every listener currently being served.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.shared.registry.addrs()
    }

    /// The number of upgraded connections currently open.
    pub fn connection_count(&self) -> usize {
        self.shared.registry.connection_count()
    }
}

impl<H: Handler, U> Debug for Server<H, U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("closed", &self.shared.is_closed())
            .field("backoff", &self.shared.backoff)
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}
