// ============================================================================
// Order Lifecycle Reconciler
// ============================================================================
//
// The core of the service: the status state machine, the creation flow
// (persist first, publish second), and the stock-event handling that keeps
// queue and store consistent under at-least-once delivery.
//
// - transition - pure state machine, pending -> validated | failed
// - service    - OrderService: creation, reads, patches, stock handling
// - consumer   - the dedicated loop draining the stock_events queue
//
// ============================================================================

mod consumer;
mod service;
mod transition;

pub use consumer::run_stock_consumer;
pub use service::{Disposition, OrderService};
pub use transition::{plan_transition, ConflictPolicy, TransitionPlan};
