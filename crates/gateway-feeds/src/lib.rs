//! # Feeds
//!
//! The subscription surface of the gateway:
//!
//! - [`FeedType`] and the per-feed include-field catalogs
//! - [`Notification`] — the tagged variant delivered to subscribers,
//!   with include-list projection
//! - [`filter`] — the predicate language evaluated against transaction
//!   field maps
//! - [`FeedManager`] — the UUID-keyed subscription registry and fan-out

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod feed;
pub mod filter;
pub mod manager;
pub mod notification;

pub use feed::FeedType;
pub use filter::{FieldValue, FilterError, FilterExpr};
pub use manager::{FeedManager, Subscription, SubscriptionDetails};
pub use notification::{
    BeaconBlockNotification, EthBlockNotification, Notification, OnBlockNotification,
    TxNotification, TxReceiptNotification,
};
