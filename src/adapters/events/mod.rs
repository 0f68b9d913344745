//! Event bus adapters.
//!
//! Billing announces purchases and subscription transitions to the rest
//! of the platform through the `EventPublisher` port:
//!
//! - `InMemoryEventBus` - Synchronous, in-process bus for testing

mod in_memory;

pub use in_memory::InMemoryEventBus;
