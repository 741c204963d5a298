//! # History Subscriber
//!
//! Client for the live calculation history feed. A [`ReconnectingSubscriber`]
//! keeps a local copy of the history up to date over a WebSocket and
//! reconnects after a fixed delay whenever the connection is lost, until it is
//! closed.
//!
//! ```rust,no_run
//! use history_subscriber::{FeedEvent, ReconnectingSubscriber, SubscriberConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SubscriberConfig::new("ws://127.0.0.1:8000/ws");
//! let (subscriber, mut events) = ReconnectingSubscriber::spawn(config)?;
//!
//! while let Some(event) = events.recv().await {
//!     if let FeedEvent::RecordAppended(record) = event {
//!         println!("{} = {}", record.expression, record.result);
//!         break;
//!     }
//! }
//!
//! subscriber.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod subscriber;

pub use config::SubscriberConfig;
pub use error::{ConnectionFailure, SubscriberError, SubscriberResult};
pub use subscriber::{ConnectionState, FeedEvent, ReconnectingSubscriber};
