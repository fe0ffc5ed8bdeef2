//! Client side of the Space's TCP front door.

use std::marker::PhantomData;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::core::task::{Task, TaskId, TaskResult};
use crate::error::{Error, Result};
use crate::net::codec::{FrameReader, FrameWriter};
use crate::net::protocol::{ClientReply, ClientRequest, Hello};
use crate::flog_debug;

/// Connection to a Space that submits roots and takes final results.
///
/// # Example
///
/// ```ignore
/// let mut client = Client::<JobTask>::connect("127.0.0.1:1099").await?;
/// client.submit(task, None).await?;
/// let result = client.take().await?;
/// ```
pub struct Client<T: Task> {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    _task: PhantomData<fn() -> T>,
}

impl<T: Task> Client<T> {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::transport(format!("connect {}: {}", addr, e)))?;
        let (read, write) = stream.into_split();
        let mut writer = FrameWriter::new(write);
        writer.send(&Hello::Client).await?;
        flog_debug!("Client connected to {}", addr);
        Ok(Self {
            reader: FrameReader::new(read),
            writer,
            _task: PhantomData,
        })
    }

    async fn request(&mut self, request: &ClientRequest<T>) -> Result<ClientReply<T>> {
        self.writer.send(request).await?;
        self.reader.expect().await
    }

    /// Submit a root task. Returns the id the Space gave it.
    pub async fn submit(&mut self, task: T, shared: Option<T::Shared>) -> Result<TaskId> {
        match self.request(&ClientRequest::Submit { task, shared }).await? {
            ClientReply::Accepted { task_id } => Ok(task_id),
            other => Err(unexpected(other)),
        }
    }

    /// Block until the Space publishes a final result.
    pub async fn take(&mut self) -> Result<TaskResult<T::Output>> {
        match self.request(&ClientRequest::Take).await? {
            ClientReply::Result { result } => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the Space to stop every worker and shut down.
    pub async fn stop(mut self) -> Result<()> {
        match self.request(&ClientRequest::Stop).await? {
            ClientReply::Stopped => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected<T: Task>(reply: ClientReply<T>) -> Error {
    match reply {
        ClientReply::Stopped => Error::Interrupted,
        ClientReply::Error { message } => Error::Transport(message),
        ClientReply::Accepted { .. } => Error::transport("unexpected reply: accepted"),
        ClientReply::Result { .. } => Error::transport("unexpected reply: result"),
    }
}
