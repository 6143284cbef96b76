pub mod client;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{GatewayClient, GatewayConnection};
pub use protocol::{AgentStatus, ClientMessage, ServerMessage};
pub use server::GatewayServer;
pub use session::{Session, SessionRegistry};
pub use transport::{SessionChannel, Transport};
