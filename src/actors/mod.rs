//! Actor-based monitoring core
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels. Callers hold cloneable handles; the actors own their state.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   Hub (main)    │
//!                    └────────┬────────┘
//!                             │ spawns
//!                    ┌────────▼────────┐        ┌──────────────────┐
//!                    │ SchedulerActor  │───────▶│ Probe (per svc)  │
//!                    │ (tick driver)   │◀───────│ HTTP / TCP       │
//!                    └────────┬────────┘        └──────────────────┘
//!                             │ apply results
//!                    ┌────────▼────────┐
//!                    │ ServiceRegistry │
//!                    └────────┬────────┘
//!                             │ snapshot / transitions
//!              ┌──────────────┼───────────────────┐
//!              │              │                   │
//!      ┌───────▼──────┐ ┌─────▼─────────┐ ┌───────▼───────┐
//!      │ StorageActor │ │ LiveBroadcast │ │ NotifierActor │
//!      │ (mpsc)       │ │ (broadcast)   │ │ (mpsc)        │
//!      └──────────────┘ └───────────────┘ └───────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **SchedulerActor**: Probes every service each tick and fans results out
//! - **StorageActor**: Writes records to the record store, in order
//! - **NotifierActor**: Keeps the chat status message edited in place
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: The live sink publishes to a broadcast channel for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod notifier;
pub mod scheduler;
pub mod storage;
