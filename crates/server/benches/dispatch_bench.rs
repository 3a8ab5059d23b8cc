use std::io;
use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use http::{Request, Response};
use micro_server::backoff::Backoff;
use micro_server::connection::{Close, ConnectionInfo, Listener, MultiplexedConnection, RequestEvent};
use micro_server::error::{BoxError, CloseError};
use micro_server::handler::make_handler;
use micro_server::server::Server;
use tokio::runtime::Runtime;
use tokio::sync::{Mutex, oneshot};

const REQUESTS: usize = 256;

fn addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

// A connection that hands out a fixed batch of requests, then ends
struct BatchConnection {
    events: Mutex<Vec<RequestEvent<Bytes, Bytes>>>,
}

impl Close for BatchConnection {
    fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

#[async_trait]
impl MultiplexedConnection for BatchConnection {
    type ReqBody = Bytes;
    type RespBody = Bytes;

    async fn next_request(&self) -> Result<Option<RequestEvent<Bytes, Bytes>>, BoxError> {
        Ok(self.events.lock().await.pop())
    }
}

// A listener that yields a single connection, then reports itself closed
struct OnceListener {
    connection: StdMutex<Option<BatchConnection>>,
}

impl Close for OnceListener {
    fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

#[async_trait]
impl Listener for OnceListener {
    type Conn = BatchConnection;

    async fn accept(&self) -> io::Result<Option<(BatchConnection, ConnectionInfo)>> {
        let connection = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        Ok(connection.map(|connection| (connection, ConnectionInfo::new(addr(), addr()))))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(addr())
    }
}

async fn pong(_req: Request<Bytes>, _info: ConnectionInfo) -> Result<Response<Bytes>, BoxError> {
    Ok(Response::new(Bytes::from_static(b"pong")))
}

async fn upgrade(connection: BatchConnection, _info: ConnectionInfo) -> Result<BatchConnection, BoxError> {
    Ok(connection)
}

fn bench_backoff(c: &mut Criterion) {
    let backoff = Backoff::default();

    c.bench_function("backoff_sequence", |b| {
        b.iter(|| {
            let mut delay = None;
            for _ in 0..16 {
                delay = Some(backoff.next(black_box(delay)));
            }
            black_box(delay)
        });
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");

    c.bench_function("dispatch_256_requests", |b| {
        b.to_async(&runtime).iter(|| async {
            let server = Server::new(make_handler(pong), upgrade);

            let mut events = Vec::with_capacity(REQUESTS);
            let mut receivers = Vec::with_capacity(REQUESTS);
            for _ in 0..REQUESTS {
                let (tx, rx) = oneshot::channel();
                events.push(RequestEvent::new(Request::new(Bytes::from_static(b"ping")), tx));
                receivers.push(rx);
            }
            let listener = OnceListener { connection: StdMutex::new(Some(BatchConnection { events: Mutex::new(events) })) };

            server.serve(listener).await.expect("serve");
            for rx in receivers {
                black_box(rx.await.expect("response"));
            }
        });
    });
}

criterion_group!(benches, bench_backoff, bench_dispatch);
criterion_main!(benches);
