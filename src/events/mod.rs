pub mod bus;
pub mod scheduler;
pub mod transport;
pub mod types;

// Re-export key types for convenience
pub use bus::{
    handler_fn, EventBus, EventBusStats, EventHandler, FnHandler, SubscriptionInfo,
    SubscriptionOptions,
};
pub use scheduler::{DelayScheduler, TokioDelayScheduler};
pub use transport::{
    ChannelPattern, EventTransport, InMemoryTransport, SubscriptionId, TransportError,
    TransportMessage,
};
pub use types::{DeadLetterRecord, Event, EventDraft, EventId};
