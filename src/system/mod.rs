//! The runtime: the Space coordinator, the Computer workers and the
//! messages between them.

pub mod computer;
pub mod local;
pub mod pool;
pub mod protocol;
pub mod space;

pub use computer::Computer;
pub use local::LocalWorker;
pub use protocol::{ToSpace, ToWorker, WorkerId};
pub use space::{Space, SpaceHandle, SpaceStats};
