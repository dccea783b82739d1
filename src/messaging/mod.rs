// ============================================================================
// Messaging Module
// ============================================================================
//
// Owns the broker connection and the two queues the reconciliation protocol
// runs on: order_events outbound, stock_events inbound. The channel is an
// explicitly constructed object - connect() either yields a ready channel
// or an error; there is no half-initialized ambient handle.
//
// ============================================================================

mod channel;

pub use channel::{ChannelConfig, EventChannel, ORDER_EVENTS_TOPIC, STOCK_EVENTS_TOPIC};
