use crate::connection::ConnectionEvent;
use std::collections::HashMap;
use system::ConnectionId;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

/// Egress channels of the sockets currently attached to the server.
#[derive(Debug, Default)]
pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connection_txs.contains_key(connection_id)
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    pub async fn send(&self, to: &ConnectionId, message: ConnectionEvent) {
        match self.connection_txs.get(to) {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    log::warn!("connection {} stopped listening", to);
                }
            }
            None => log::debug!("connection {} is detached, dropping {:?}", to, message),
        }
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }
}
