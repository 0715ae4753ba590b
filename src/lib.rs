//! # membus
//!
//! `membus` is a minimalist, in-process publish/subscribe message broker built
//! on Tokio. Independent parts of a running program exchange messages by topic
//! name without knowing about each other: a publisher hands a message and a
//! topic string to the broker, and every handler currently subscribed to that
//! topic receives it through its own dedicated delivery worker.
//!
//! There is no network transport, no persistence and no cross-topic ordering.
//! The crate is the broker mechanism plus its concurrency guarantees.
//!
//! ## Core Modules
//!
//! - `broker`: The central component that manages the topic registry,
//!   subscriptions and per-subscriber message delivery.
//! - `config`: Handles loading and managing broker configuration.
//! - `utils`: Shared utilities, such as logging setup.
//!
//! ## Example
//!
//! ```
//! use membus::Broker;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let broker: Broker<String> = Broker::new();
//! let sub = broker.subscribe("greetings", |msg| println!("got: {msg}"));
//! broker.publish("greetings", "hello".to_string()).await;
//! sub.unsubscribe();
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod utils;

pub use broker::{Broker, Subscription};
