//! clipferry — a clipboard and drag-and-drop data broker.
//!
//! Bridges an application's native core and the OS data-exchange
//! facilities: publishes the core's data as content URIs served through
//! pipes, negotiates formats for and reads foreign clipboard and drag
//! items, and tracks the drag sessions this process starts.

pub mod broker;
pub mod native;
pub mod provider;
pub mod resolver;
pub mod transfer;

pub use broker::{Broker, BrokerConfig, BrokerError, BrokerHandle};
