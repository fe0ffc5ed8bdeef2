//! TCP front door of the Space.
//!
//! Every connection starts with a [`Hello`]. Workers are registered and then
//! exchange `ToWorker`/`ToSpace` frames until either side goes away; clients
//! send requests and get one reply per request.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::core::task::{Task, TaskNode};
use crate::error::{Error, Result};
use crate::net::codec::{FrameReader, FrameWriter};
use crate::net::protocol::{ClientReply, ClientRequest, Hello};
use crate::system::protocol::{ToSpace, ToWorker};
use crate::system::space::Space;
use crate::{flog, flog_debug, flog_error, flog_warn};

pub struct Server<T: Task> {
    space: Arc<Space<T>>,
    listener: TcpListener,
}

impl<T: Task> Server<T> {
    pub async fn bind(space: Arc<Space<T>>, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::transport(format!("bind {}: {}", addr, e)))?;
        Ok(Self { space, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the Space is stopped.
    pub async fn run(self) -> Result<()> {
        flog!("Space listening on {}", self.local_addr()?);
        loop {
            let accepted = tokio::select! {
                _ = self.space.stopped() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    flog_debug!("Connection from {}", peer);
                    tokio::spawn(handle_connection(Arc::clone(&self.space), stream, peer));
                }
                Err(e) => flog_warn!("Accept failed: {}", e),
            }
        }
        flog!("Space server stopped");
        Ok(())
    }
}

async fn handle_connection<T: Task>(space: Arc<Space<T>>, stream: TcpStream, peer: SocketAddr) {
    let (read, write) = stream.into_split();
    let mut reader = FrameReader::new(read);
    let writer = FrameWriter::new(write);

    let outcome = match reader.expect::<Hello>().await {
        Ok(Hello::Worker { parallelism }) => serve_worker(space, reader, writer, parallelism).await,
        Ok(Hello::Client) => serve_client(space, reader, writer).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(()) => flog_debug!("Connection from {} closed", peer),
        Err(e) if e.is_transport() => flog_debug!("Connection from {} dropped: {}", peer, e),
        Err(e) => flog_warn!("Connection from {} ended: {}", peer, e),
    }
}

async fn serve_worker<T: Task>(
    space: Arc<Space<T>>,
    mut reader: FrameReader<OwnedReadHalf>,
    mut writer: FrameWriter<OwnedWriteHalf>,
    parallelism: usize,
) -> Result<()> {
    let (link, mut outbound) = mpsc::unbounded_channel::<ToWorker<T>>();
    let handle = space.register_worker(link, parallelism)?;
    let worker_id = handle.worker_id();

    // Outbound frames. Ends when the Space drops the link or after Exit.
    let sender = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                let exit = matches!(message, ToWorker::Exit);
                if let Err(e) = writer.send(&message).await {
                    flog_warn!("Worker {} unreachable: {}", worker_id, e);
                    handle.disconnect();
                    break;
                }
                if exit {
                    break;
                }
            }
        })
    };

    let evicted = handle.evicted();
    let outcome = loop {
        let frame = tokio::select! {
            _ = evicted.cancelled() => break Ok(()),
            frame = reader.next::<ToSpace<T>>() => frame,
        };
        match frame {
            Ok(Some(message)) => match handle.deliver(message).await {
                Ok(()) => {}
                Err(Error::Interrupted) => break Ok(()),
                Err(e) => flog_error!("Report from worker {} rejected: {}", worker_id, e),
            },
            Ok(None) => {
                flog!("Worker {} disconnected", worker_id);
                handle.disconnect();
                break Ok(());
            }
            Err(e) => {
                handle.disconnect();
                break Err(e);
            }
        }
    };

    if !space.is_stopped() {
        sender.abort();
    }
    outcome
}

async fn serve_client<T: Task>(
    space: Arc<Space<T>>,
    mut reader: FrameReader<OwnedReadHalf>,
    mut writer: FrameWriter<OwnedWriteHalf>,
) -> Result<()> {
    while let Some(request) = reader.next::<ClientRequest<T>>().await? {
        let (reply, done): (ClientReply<T>, bool) = match request {
            ClientRequest::Submit { task, shared } => {
                let root = match shared {
                    Some(value) => TaskNode::root(task).with_shared(value),
                    None => TaskNode::root(task),
                };
                let task_id = root.id;
                match space.submit(root) {
                    Ok(()) => (ClientReply::Accepted { task_id }, false),
                    Err(Error::Interrupted) => (ClientReply::Stopped, true),
                    Err(e) => (ClientReply::Error { message: e.to_string() }, false),
                }
            }
            ClientRequest::Take => match space.take().await {
                Ok(result) => (ClientReply::Result { result }, false),
                Err(Error::Interrupted) => (ClientReply::Stopped, true),
                Err(e) => (ClientReply::Error { message: e.to_string() }, false),
            },
            ClientRequest::Stop => {
                flog!("Stop requested by client");
                space.stop();
                (ClientReply::Stopped, true)
            }
        };
        writer.send(&reply).await?;
        if done {
            break;
        }
    }
    Ok(())
}
