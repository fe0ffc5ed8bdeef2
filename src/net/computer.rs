//! A Computer process talking to a remote Space over TCP.

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::core::task::Task;
use crate::error::{Error, Result};
use crate::net::codec::{FrameReader, FrameWriter};
use crate::net::protocol::Hello;
use crate::system::computer::Computer;
use crate::system::protocol::{ToSpace, ToWorker};
use crate::{flog, flog_warn};

/// Connect to the Space at `addr`, register, and compute until told to exit.
///
/// Returns `Error::Transport` when the Space cannot be reached or drops the
/// connection without sending `Exit`.
pub async fn run_worker<T: Task>(addr: &str, settings: Settings) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::transport(format!("connect {}: {}", addr, e)))?;
    stream.set_nodelay(true)?;
    let (read, write) = stream.into_split();
    let mut reader = FrameReader::new(read);
    let mut writer = FrameWriter::new(write);

    let parallelism = settings.parallelism();
    writer.send(&Hello::Worker { parallelism }).await?;
    flog!("Connected to space at {} (parallelism={})", addr, parallelism);

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<ToWorker<T>>();
    let (uplink_tx, mut uplink_rx) = mpsc::unbounded_channel::<ToSpace<T>>();
    let computer = tokio::spawn(Computer::new(settings, uplink_tx).run(inbox_rx));

    let uplink = tokio::spawn(async move {
        while let Some(message) = uplink_rx.recv().await {
            writer.send(&message).await?;
        }
        Ok::<_, Error>(())
    });

    let inbound: Result<()> = loop {
        match reader.next::<ToWorker<T>>().await {
            Ok(Some(message)) => {
                let exit = matches!(message, ToWorker::Exit);
                if inbox_tx.send(message).is_err() || exit {
                    break Ok(());
                }
            }
            Ok(None) => break Err(Error::transport("space closed the connection")),
            Err(e) => break Err(e),
        }
    };
    drop(inbox_tx);

    let computed = computer.await.map_err(|e| Error::TaskJoin(e.to_string()))?;
    uplink.abort();
    if let Err(e) = &inbound {
        flog_warn!("Lost the space: {}", e);
    }
    computed.and(inbound)
}
