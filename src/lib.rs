//! Swap lifecycle engine for a peer-to-peer product swap marketplace.
//!
//! The crate owns the consistency core of the marketplace: the
//! [`service::SwapService`] state machine that moves swap requests and
//! swap transactions through their lifecycles, the stateless
//! [`validate`] checks in front of it, and the [`review`] eligibility
//! gate behind it. Persistence is a single transactional sled keyspace
//! ([`store::SwapStore`]); side effects leave the engine only as
//! [`events::LifecycleEvent`]s.

pub mod error;
pub mod events;
pub mod ids;
pub mod product;
pub mod review;
pub mod service;
pub mod store;
pub mod swap;
pub mod user;
pub mod validate;

pub use error::{ConflictError, IllegalTransition, SwapError, ValidationError};
pub use events::{EventSink, LifecycleEvent, MemorySink};
pub use ids::{ProductId, RequestId, SwapId, TimeStamp, UserId};
pub use service::{SwapDecision, SwapOutcome, SwapRef, SwapService};
