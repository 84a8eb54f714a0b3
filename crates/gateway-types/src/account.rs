//! Customer account model consumed from the SDN account service.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque customer account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Service tier of a customer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountTier {
    Developer,
    Professional,
    Enterprise,
    EnterpriseElite,
    Ultra,
}

impl AccountTier {
    /// Enterprise and above may hold websocket connections.
    #[must_use]
    pub fn is_enterprise(&self) -> bool {
        matches!(
            self,
            AccountTier::Enterprise | AccountTier::EnterpriseElite | AccountTier::Ultra
        )
    }

    /// Elite and above may target the premium builder.
    #[must_use]
    pub fn is_elite(&self) -> bool {
        matches!(self, AccountTier::EnterpriseElite | AccountTier::Ultra)
    }
}

impl fmt::Display for AccountTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountTier::Developer => "Developer",
            AccountTier::Professional => "Professional",
            AccountTier::Enterprise => "Enterprise",
            AccountTier::EnterpriseElite => "EnterpriseElite",
            AccountTier::Ultra => "Ultra",
        };
        f.write_str(name)
    }
}

/// Per-feed entitlement attached to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntitlement {
    /// Whether the feed may carry a filter expression.
    pub allow_filtering: bool,
    /// Include fields the account may request. `["all"]` grants everything.
    pub available_fields: Vec<String>,
    /// Entitlement expiry date, `YYYY-MM-DD`.
    pub expire_date: String,
}

impl FeedEntitlement {
    /// An entitlement granting every field, filtering allowed, far-future expiry.
    #[must_use]
    pub fn all() -> Self {
        Self {
            allow_filtering: true,
            available_fields: vec!["all".to_string()],
            expire_date: "2999-01-01".to_string(),
        }
    }

    /// An entitlement that denies the feed outright.
    #[must_use]
    pub fn none() -> Self {
        Self {
            allow_filtering: false,
            available_fields: Vec::new(),
            expire_date: "2000-01-01".to_string(),
        }
    }

    /// True when the expiry date is in the past (or unparseable).
    #[must_use]
    pub fn expired(&self) -> bool {
        match NaiveDate::parse_from_str(&self.expire_date, "%Y-%m-%d") {
            Ok(date) => Utc::now().date_naive() > date,
            Err(_) => true,
        }
    }
}

/// Customer account as reported by the SDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub secret_hash: String,
    pub tier: AccountTier,
    pub new_transaction_streaming: FeedEntitlement,
    pub pending_transaction_streaming: FeedEntitlement,
    pub new_block_streaming: FeedEntitlement,
    pub on_block_feed: FeedEntitlement,
    pub transaction_receipt_feed: FeedEntitlement,
}

impl Account {
    /// The fallback profile used when the SDN cannot be reached: a fully
    /// entitled elite account for the presented account ID.
    #[must_use]
    pub fn default_elite(account_id: AccountId) -> Self {
        Self {
            account_id,
            secret_hash: String::new(),
            tier: AccountTier::EnterpriseElite,
            new_transaction_streaming: FeedEntitlement::all(),
            pending_transaction_streaming: FeedEntitlement::all(),
            new_block_streaming: FeedEntitlement::all(),
            on_block_feed: FeedEntitlement::all(),
            transaction_receipt_feed: FeedEntitlement::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(AccountTier::Enterprise.is_enterprise());
        assert!(AccountTier::Ultra.is_enterprise());
        assert!(!AccountTier::Professional.is_enterprise());
        assert!(AccountTier::EnterpriseElite.is_elite());
        assert!(!AccountTier::Enterprise.is_elite());
    }

    #[test]
    fn test_entitlement_expiry() {
        assert!(!FeedEntitlement::all().expired());
        assert!(FeedEntitlement::none().expired());

        let garbage = FeedEntitlement {
            expire_date: "not-a-date".to_string(),
            ..FeedEntitlement::all()
        };
        assert!(garbage.expired());
    }

    #[test]
    fn test_default_elite_profile() {
        let account = Account::default_elite(AccountId::from("acct-1"));
        assert_eq!(account.account_id.as_str(), "acct-1");
        assert!(account.tier.is_elite());
        assert!(account.new_transaction_streaming.allow_filtering);
    }
}
