//! TCP transport: JSON-lines framing, the handshake, and the server, worker
//! and client ends.

pub mod client;
pub mod codec;
pub mod computer;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use computer::run_worker;
pub use protocol::{ClientReply, ClientRequest, Hello};
pub use server::Server;
