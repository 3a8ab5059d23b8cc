//! In-memory listeners and connections driven by a script.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use http::{Request, Response};
use tokio::select;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::connection::{
    BindOptions, CertInfo, Close, ConnectionInfo, Listener, MultiplexedConnection, RequestEvent, ResponseSink, TlsBind,
    Upgrade,
};
use crate::error::{BoxError, CloseError};

pub(crate) fn addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

pub(crate) fn info() -> ConnectionInfo {
    ConnectionInfo::new(addr(), SocketAddr::from(([127, 0, 0, 1], 50000)))
}

pub(crate) type Event = RequestEvent<String, String>;

pub(crate) fn request(body: &str) -> (Event, oneshot::Receiver<Response<String>>) {
    let (tx, rx) = oneshot::channel();
    (RequestEvent::new(Request::new(body.to_string()), tx), rx)
}

/// Counts `close` calls; the first one succeeds and wakes pending waiters.
#[derive(Debug, Default)]
pub(crate) struct CloseState {
    closes: AtomicUsize,
    shutdown: CancellationToken,
}

impl CloseState {
    fn close(&self) -> Result<(), CloseError> {
        if self.closes.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(CloseError::AlreadyClosed);
        }
        self.shutdown.cancel();
        Ok(())
    }
}

enum ConnectionStep {
    Request(Event),
    Fail(io::Error),
    End,
}

pub(crate) struct ScriptedConnection {
    steps: Mutex<mpsc::UnboundedReceiver<ConnectionStep>>,
    reads: Arc<AtomicUsize>,
    doomed: Arc<AtomicBool>,
    state: Arc<CloseState>,
}

pub(crate) struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ConnectionStep>,
    reads: Arc<AtomicUsize>,
    doomed: Arc<AtomicBool>,
    state: Arc<CloseState>,
}

impl ScriptedConnection {
    pub(crate) fn new() -> (Self, ConnectionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reads = Arc::new(AtomicUsize::new(0));
        let doomed = Arc::new(AtomicBool::new(false));
        let state = Arc::new(CloseState::default());
        let connection = Self {
            steps: Mutex::new(rx),
            reads: Arc::clone(&reads),
            doomed: Arc::clone(&doomed),
            state: Arc::clone(&state),
        };
        (connection, ConnectionHandle { tx, reads, doomed, state })
    }

    /// Whether an upgrade of this connection is supposed to fail.
    pub(crate) fn is_doomed(&self) -> bool {
        self.doomed.load(Ordering::SeqCst)
    }
}

impl ConnectionHandle {
    pub(crate) fn push(&self, event: Event) {
        let _ = self.tx.send(ConnectionStep::Request(event));
    }

    pub(crate) fn fail(&self, e: io::Error) {
        let _ = self.tx.send(ConnectionStep::Fail(e));
    }

    pub(crate) fn doom(&self) {
        self.doomed.store(true, Ordering::SeqCst);
    }

    /// The peer has no more requests.
    pub(crate) fn finish(&self) {
        let _ = self.tx.send(ConnectionStep::End);
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

impl Close for ScriptedConnection {
    fn close(&self) -> Result<(), CloseError> {
        self.state.close()
    }
}

#[async_trait]
impl MultiplexedConnection for ScriptedConnection {
    type ReqBody = String;
    type RespBody = String;

    async fn next_request(&self) -> Result<Option<Event>, BoxError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().await;
        select! {
            biased;
            () = self.state.shutdown.cancelled() => Ok(None),
            step = steps.recv() => match step {
                Some(ConnectionStep::Request(event)) => Ok(Some(event)),
                Some(ConnectionStep::Fail(e)) => Err(e.into()),
                Some(ConnectionStep::End) | None => Ok(None),
            },
        }
    }
}

enum AcceptStep {
    Connection(ScriptedConnection),
    Fail(io::Error),
    End,
}

pub(crate) struct ScriptedListener {
    steps: Mutex<mpsc::UnboundedReceiver<AcceptStep>>,
    accepts: Arc<AtomicUsize>,
    state: Arc<CloseState>,
}

#[derive(Clone)]
pub(crate) struct ListenerHandle {
    tx: mpsc::UnboundedSender<AcceptStep>,
    accepts: Arc<AtomicUsize>,
    state: Arc<CloseState>,
}

impl ScriptedListener {
    pub(crate) fn new() -> (Self, ListenerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let accepts = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(CloseState::default());
        let listener = Self { steps: Mutex::new(rx), accepts: Arc::clone(&accepts), state: Arc::clone(&state) };
        (listener, ListenerHandle { tx, accepts, state })
    }
}

impl ListenerHandle {
    pub(crate) fn connect(&self, connection: ScriptedConnection) {
        let _ = self.tx.send(AcceptStep::Connection(connection));
    }

    pub(crate) fn fail(&self, e: io::Error) {
        let _ = self.tx.send(AcceptStep::Fail(e));
    }

    /// Makes the listener report itself closed once the script runs out.
    pub(crate) fn finish(&self) {
        let _ = self.tx.send(AcceptStep::End);
    }

    /// Closes the listener from outside the server, like its owner would.
    pub(crate) fn close(&self) -> Result<(), CloseError> {
        self.state.close()
    }

    pub(crate) fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

impl Close for ScriptedListener {
    fn close(&self) -> Result<(), CloseError> {
        self.state.close()
    }
}

#[async_trait]
impl Listener for ScriptedListener {
    type Conn = ScriptedConnection;

    async fn accept(&self) -> io::Result<Option<(Self::Conn, ConnectionInfo)>> {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().await;
        select! {
            biased;
            () = self.state.shutdown.cancelled() => Ok(None),
            step = steps.recv() => match step {
                Some(AcceptStep::Connection(connection)) => Ok(Some((connection, info()))),
                Some(AcceptStep::Fail(e)) => Err(e),
                Some(AcceptStep::End) | None => Ok(None),
            },
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(addr())
    }
}

/// Scripted connections arrive already multiplexed.
pub(crate) fn identity_upgrade() -> impl Upgrade<ScriptedConnection, Output = ScriptedConnection> {
    |connection: ScriptedConnection, _info: ConnectionInfo| async move { Ok::<_, BoxError>(connection) }
}

/// A sink whose transport is already gone.
pub(crate) struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub(crate) fn new() -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (Self { attempts: Arc::clone(&attempts) }, attempts)
    }
}

#[async_trait]
impl ResponseSink<String> for FailingSink {
    async fn respond_with(self: Box<Self>, _response: Response<String>) -> Result<(), BoxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err("connection reset by peer".into())
    }
}

/// A TLS binder that hands out a prepared listener once, and fails to bind
/// when it has none left.
pub(crate) struct ScriptedTls {
    listener: StdMutex<Option<ScriptedListener>>,
    bound: StdMutex<Option<(BindOptions, CertInfo)>>,
}

impl ScriptedTls {
    pub(crate) fn serving(listener: ScriptedListener) -> Self {
        Self { listener: StdMutex::new(Some(listener)), bound: StdMutex::new(None) }
    }

    pub(crate) fn unbindable() -> Self {
        Self { listener: StdMutex::new(None), bound: StdMutex::new(None) }
    }

    /// The options and certificate of the last bind attempt.
    pub(crate) fn bound(&self) -> Option<(BindOptions, CertInfo)> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TlsBind for ScriptedTls {
    type Listener = ScriptedListener;

    async fn bind_tls(&self, options: &BindOptions, cert: &CertInfo) -> io::Result<ScriptedListener> {
        *self.bound.lock().unwrap_or_else(PoisonError::into_inner) = Some((*options, cert.clone()));
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take();
        listener.ok_or_else(|| io::Error::from(io::ErrorKind::AddrInUse))
    }
}
