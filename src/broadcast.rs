// Fan-out of accepted sale transactions to connected viewer sessions.

use tokio::sync::broadcast;

use crate::auction::ledger::LedgerAction;
use crate::auction::player::Player;

/// Buffer size for the update channel. A lagged viewer drops the oldest
/// events and re-syncs on reconnect via the snapshot.
const UPDATE_BUFFER_SIZE: usize = 256;

/// One published update: the fully-updated player record (not a diff) plus
/// the operation classification.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerUpdate {
    pub player: Player,
    pub operation: LedgerAction,
}

/// Best-effort broadcast channel for player updates.
///
/// Each subscriber receives events in publish order. Delivery is only
/// attempted while a session is connected; disconnected sessions rely on the
/// connect-time snapshot to catch up.
#[derive(Debug, Clone)]
pub struct UpdateBus {
    tx: broadcast::Sender<PlayerUpdate>,
}

impl UpdateBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(UPDATE_BUFFER_SIZE);
        Self { tx }
    }

    /// Publish an update to all current subscribers. Fire-and-forget: having
    /// zero connected viewers is not an error, and the caller never waits on
    /// delivery.
    pub fn publish(&self, player: Player, operation: LedgerAction) {
        let _ = self.tx.send(PlayerUpdate { player, operation });
    }

    /// Register a new viewer session.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerUpdate> {
        self.tx.subscribe()
    }

    /// Number of currently connected sessions.
    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::player::{Position, TeamName};

    fn sold_player(id: &str, price: u32) -> Player {
        Player {
            sold: true,
            team: Some(TeamName::Giants),
            price,
            modified_time: Some(1),
            ..Player::unsold(id, "Test", Position::Member)
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = UpdateBus::new();
        bus.publish(sold_player("1", 100), LedgerAction::Sell);
        assert_eq!(bus.session_count(), 0);
    }

    #[tokio::test]
    async fn all_subscribers_receive_every_update() {
        let bus = UpdateBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(sold_player("1", 100), LedgerAction::Sell);

        let ua = a.recv().await.unwrap();
        let ub = b.recv().await.unwrap();
        assert_eq!(ua, ub);
        assert_eq!(ua.player.id, "1");
        assert_eq!(ua.operation, LedgerAction::Sell);
    }

    #[tokio::test]
    async fn subscriber_sees_updates_in_publish_order() {
        let bus = UpdateBus::new();
        let mut rx = bus.subscribe();

        bus.publish(sold_player("1", 100), LedgerAction::Sell);
        bus.publish(sold_player("1", 200), LedgerAction::Update);
        bus.publish(sold_player("2", 300), LedgerAction::Sell);

        assert_eq!(rx.recv().await.unwrap().player.price, 100);
        assert_eq!(rx.recv().await.unwrap().player.price, 200);
        assert_eq!(rx.recv().await.unwrap().player.id, "2");
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_updates() {
        let bus = UpdateBus::new();
        bus.publish(sold_player("1", 100), LedgerAction::Sell);

        // A session connecting after the publish gets nothing from the bus;
        // the connect-time snapshot is its baseline.
        let mut rx = bus.subscribe();
        bus.publish(sold_player("2", 200), LedgerAction::Sell);
        assert_eq!(rx.recv().await.unwrap().player.id, "2");
        assert!(rx.try_recv().is_err());
    }
}
