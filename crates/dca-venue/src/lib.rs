//! Venue contract and adapters.
//!
//! - [`Venue`]: the dyn-compatible trait every venue adapter implements
//! - [`GuardedVenue`]: wraps any venue with rate limiting, circuit breaking,
//!   per-call timeouts and categorized retry
//! - [`PaperVenue`]: in-memory venue with failure injection

pub mod error;
pub mod guarded;
pub mod paper;
pub mod types;
pub mod venue;

pub use error::{VenueError, VenueResult};
pub use guarded::{GuardedVenue, DEFAULT_CALL_TIMEOUT};
pub use paper::PaperVenue;
pub use types::{OpenOrder, OrderAck, PlaceOrderRequest, VenuePosition};
pub use venue::{BoxFuture, DynVenue, Venue};
