//! Subscription registry and notification fan-out.

use crate::feed::FeedType;
use crate::notification::Notification;
use dashmap::DashMap;
use gateway_types::{AccountId, AccountTier};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Notifications buffered per subscription before a slow reader starts
/// losing messages.
pub const SUBSCRIPTION_BACKLOG: usize = 1000;

/// Identity and parameters of one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionDetails {
    pub id: Uuid,
    pub feed: FeedType,
    pub account_id: AccountId,
    pub tier: AccountTier,
    pub remote_address: String,
    pub includes: Vec<String>,
    pub filters: String,
}

/// The reader half handed to the connection task. Exactly one reader per
/// subscription; the feed manager holds the writer half.
pub struct Subscription {
    pub details: SubscriptionDetails,
    pub notifications: mpsc::Receiver<Notification>,
    pub errors: mpsc::Receiver<String>,
}

struct SubscriptionEntry {
    details: SubscriptionDetails,
    sender: mpsc::Sender<Notification>,
    error_sender: mpsc::Sender<String>,
}

/// Registry of active subscriptions with per-feed fan-out.
#[derive(Default)]
pub struct FeedManager {
    subscriptions: DashMap<Uuid, SubscriptionEntry>,
}

impl FeedManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription and hand back its reader.
    pub fn subscribe(
        &self,
        feed: FeedType,
        account_id: AccountId,
        tier: AccountTier,
        remote_address: String,
        includes: Vec<String>,
        filters: String,
    ) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, notifications) = mpsc::channel(SUBSCRIPTION_BACKLOG);
        let (error_sender, errors) = mpsc::channel(8);
        let details = SubscriptionDetails {
            id,
            feed,
            account_id,
            tier,
            remote_address,
            includes,
            filters,
        };

        self.subscriptions.insert(
            id,
            SubscriptionEntry {
                details: details.clone(),
                sender,
                error_sender,
            },
        );
        debug!(subscription_id = %id, feed = %feed, "Subscription created");

        Subscription {
            details,
            notifications,
            errors,
        }
    }

    /// Remove a subscription. Returns whether it was known.
    pub fn unsubscribe(&self, id: &Uuid) -> bool {
        let removed = self.subscriptions.remove(id).is_some();
        if removed {
            debug!(subscription_id = %id, "Subscription removed");
        }
        removed
    }

    #[must_use]
    pub fn subscription_exists(&self, id: &Uuid) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Fan a notification out to every subscription of `feed`. A saturated
    /// subscriber drops this notification and keeps its subscription; the
    /// per-subscription channel is the backpressure boundary. Returns how
    /// many subscribers received it.
    pub fn notify(&self, feed: FeedType, notification: &Notification) -> usize {
        let mut delivered = 0;
        for entry in self.subscriptions.iter() {
            if entry.details.feed != feed {
                continue;
            }
            match entry.sender.try_send(notification.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(
                        subscription_id = %entry.details.id,
                        feed = %feed,
                        "Subscriber backlog full, notification dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Push an error message to one subscription's error channel.
    pub fn send_error(&self, id: &Uuid, message: String) {
        if let Some(entry) = self.subscriptions.get(id) {
            let _ = entry.error_sender.try_send(message);
        }
    }

    /// Drop every subscription; readers observe channel closure and their
    /// connection loops exit.
    pub fn close_all(&self) {
        let count = self.subscriptions.len();
        self.subscriptions.clear();
        debug!(count, "Closed all subscriptions");
    }

    /// Snapshot of all active subscriptions (for reset notifications).
    #[must_use]
    pub fn subscription_details(&self) -> Vec<SubscriptionDetails> {
        self.subscriptions
            .iter()
            .map(|e| e.details.clone())
            .collect()
    }

    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::OnBlockNotification;

    fn subscribe(manager: &FeedManager, feed: FeedType) -> Subscription {
        manager.subscribe(
            feed,
            AccountId::from("acct"),
            AccountTier::Enterprise,
            "127.0.0.1:1000".to_string(),
            vec!["name".to_string()],
            String::new(),
        )
    }

    fn on_block(name: &str) -> Notification {
        Notification::OnBlock(OnBlockNotification {
            name: name.to_string(),
            response: String::new(),
            block_height: "0x1".to_string(),
            tag: "0x1".to_string(),
            hash: "0x0".to_string(),
        })
    }

    #[tokio::test]
    async fn test_subscribe_notify_unsubscribe() {
        let manager = FeedManager::new();
        let mut sub = subscribe(&manager, FeedType::OnBlock);
        assert!(manager.subscription_exists(&sub.details.id));

        let delivered = manager.notify(FeedType::OnBlock, &on_block("call"));
        assert_eq!(delivered, 1);
        let notification = sub.notifications.recv().await.unwrap();
        assert!(matches!(notification, Notification::OnBlock(_)));

        assert!(manager.unsubscribe(&sub.details.id));
        assert!(!manager.unsubscribe(&sub.details.id));
    }

    #[tokio::test]
    async fn test_notify_routes_by_feed() {
        let manager = FeedManager::new();
        let mut on_block_sub = subscribe(&manager, FeedType::OnBlock);
        let _receipts_sub = subscribe(&manager, FeedType::TxReceipts);

        assert_eq!(manager.notify(FeedType::OnBlock, &on_block("x")), 1);
        assert!(on_block_sub.notifications.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_notification() {
        let manager = FeedManager::new();
        let _sub = subscribe(&manager, FeedType::OnBlock);
        for _ in 0..SUBSCRIPTION_BACKLOG {
            assert_eq!(manager.notify(FeedType::OnBlock, &on_block("fill")), 1);
        }
        // Channel is full: dropped, not delivered, subscription intact.
        assert_eq!(manager.notify(FeedType::OnBlock, &on_block("dropped")), 0);
        assert_eq!(manager.total_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_close_all_ends_readers() {
        let manager = FeedManager::new();
        let mut sub = subscribe(&manager, FeedType::NewTxs);
        manager.close_all();
        assert_eq!(manager.total_subscriptions(), 0);
        assert!(sub.notifications.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_error_channel() {
        let manager = FeedManager::new();
        let mut sub = subscribe(&manager, FeedType::NewTxs);
        manager.send_error(&sub.details.id, "feed expired".to_string());
        assert_eq!(sub.errors.recv().await.unwrap(), "feed expired");
    }
}
