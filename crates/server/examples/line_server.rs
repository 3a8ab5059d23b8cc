//! Serves a toy protocol where every line sent by the client is one request
//! and every response is written back as one line.
//!
//! Try it with `nc 127.0.0.1 8080`, then type `fail` or `slow` to see how a
//! failing or slow request leaves the others alone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use http::{Request, Response};
use micro_server::connection::{BindOptions, Close, ConnectionInfo, MultiplexedConnection, RequestEvent, ResponseSink};
use micro_server::error::{BoxError, CloseError};
use micro_server::handler::make_handler;
use micro_server::server::Server;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::select;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

struct LineConnection {
    lines: Mutex<FramedRead<OwnedReadHalf, LinesCodec>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Close for LineConnection {
    fn close(&self) -> Result<(), CloseError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CloseError::AlreadyClosed);
        }
        self.shutdown.cancel();
        Ok(())
    }
}

#[async_trait]
impl MultiplexedConnection for LineConnection {
    type ReqBody = String;
    type RespBody = String;

    async fn next_request(&self) -> Result<Option<RequestEvent<String, String>>, BoxError> {
        let mut lines = self.lines.lock().await;
        select! {
            biased;
            () = self.shutdown.cancelled() => Ok(None),
            line = lines.next() => match line {
                Some(Ok(line)) => Ok(Some(RequestEvent::new(Request::new(line), LineSink { writer: Arc::clone(&self.writer) }))),
                Some(Err(e)) => Err(e.into()),
                None => Ok(None),
            },
        }
    }
}

struct LineSink {
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

#[async_trait]
impl ResponseSink<String> for LineSink {
    async fn respond_with(self: Box<Self>, response: Response<String>) -> Result<(), BoxError> {
        let line = format!("{} {}\n", response.status().as_u16(), response.body());
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn upgrade(stream: TcpStream, info: ConnectionInfo) -> Result<LineConnection, BoxError> {
    info!(remote = %info.remote_addr(), "accept new connection");
    let (reader, writer) = stream.into_split();
    Ok(LineConnection {
        lines: Mutex::new(FramedRead::new(reader, LinesCodec::new_with_max_length(8 * 1024))),
        writer: Arc::new(Mutex::new(writer)),
        closed: AtomicBool::new(false),
        shutdown: CancellationToken::new(),
    })
}

async fn shout(request: Request<String>, info: ConnectionInfo) -> Result<Response<String>, BoxError> {
    match request.body().trim() {
        "fail" => Err("asked to fail".into()),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Response::new("finally".to_string()))
        }
        line => Ok(Response::new(format!("{} says {}", info.remote_addr(), line.to_uppercase()))),
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = Server::builder(make_handler(shout), upgrade).max_concurrent_requests(1024).build();

    let closer = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("receive ctrl-c, shutting down");
            if let Err(e) = closer.close() {
                error!(cause = %e, "close server error");
            }
        }
    });

    let options = match BindOptions::resolve("127.0.0.1:8080") {
        Ok(options) => options,
        Err(e) => {
            error!(cause = %e, "resolve address error");
            return;
        }
    };

    info!(port = 8080, "start listening");
    if let Err(e) = server.listen_and_serve(options).await {
        error!(cause = %e, "serve error");
    }

    if !server.closed()
        && let Err(e) = server.close()
    {
        error!(cause = %e, "close server error");
    }
    server.drained().await;
    info!("all connections drained");
}
