//! Subscription dispatcher.
//!
//! Fans every inbound envelope out to all registered listeners.

mod dispatcher;

pub use dispatcher::{DispatchReport, DispatchStats, Dispatcher, Listener, ListenerId};
