mod handler;
mod message;
pub mod protocol;
pub mod transport;

pub use handler::{ws_handler, WsQuery};
pub use message::{Message, MessageKind};
pub use transport::{MemoryPeer, MemoryPeerSender, Transport};
