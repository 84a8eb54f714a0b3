//! Port implementations wiring the gateway core to its collaborators.

pub mod accounts;
pub mod converter;
pub mod msg_handler;
pub mod node_ws;

pub use accounts::LocalAccountService;
pub use converter::{EthConverter, EthNodeBlock};
pub use msg_handler::BridgeMsgHandler;
pub use node_ws::DisabledNodeWsManager;
