//! Gateway runtime configuration.
//!
//! In production these values come from the CLI and environment; parsing
//! lives outside this crate.

use gateway_types::{Account, AccountId, NetworkId, NetworkNum};
use gateway_ws::WsServerConfig;
use std::time::Duration;

/// Top-level configuration of one gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub websocket_port: u16,
    pub websocket_tls_enabled: bool,
    pub network_num: NetworkNum,
    pub chain_id: NetworkId,
    /// Whether a beacon P2P node or beacon API was configured.
    pub beacon_block: bool,
    /// Whether the process relays for cloud services.
    pub cloud_proxy: bool,
    /// Minimum store age before a transaction is compressed to a short ID.
    pub min_tx_age: Duration,
    /// Networks where `newBlocks` is served without a node websocket.
    pub new_blocks_no_node_networks: Vec<NetworkNum>,
    /// Account this gateway authenticates as.
    pub account_id: AccountId,
    pub secret_hash: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            websocket_port: 28333,
            websocket_tls_enabled: false,
            network_num: 5,
            chain_id: 1,
            beacon_block: false,
            cloud_proxy: false,
            min_tx_age: Duration::from_secs(2),
            new_blocks_no_node_networks: vec![5, 23, 36],
            account_id: AccountId::from("gateway"),
            secret_hash: String::new(),
        }
    }
}

impl GatewayConfig {
    /// The websocket server's view of this configuration.
    #[must_use]
    pub fn ws_server_config(&self) -> WsServerConfig {
        WsServerConfig {
            websocket_port: self.websocket_port,
            tls_enabled: self.websocket_tls_enabled,
            network_num: self.network_num,
            chain_id: self.chain_id,
            cloud_proxy: self.cloud_proxy,
            new_blocks_no_node_networks: self.new_blocks_no_node_networks.clone(),
            ..WsServerConfig::default()
        }
    }

    /// The account model this gateway runs under.
    #[must_use]
    pub fn gateway_account(&self) -> Account {
        let mut account = Account::default_elite(self.account_id.clone());
        account.secret_hash = self.secret_hash.clone();
        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_config_projection() {
        let config = GatewayConfig {
            websocket_port: 9000,
            chain_id: 56,
            network_num: 10,
            ..GatewayConfig::default()
        };
        let ws = config.ws_server_config();
        assert_eq!(ws.websocket_port, 9000);
        assert_eq!(ws.chain_id, 56);
        assert_eq!(ws.network_num, 10);
    }
}
