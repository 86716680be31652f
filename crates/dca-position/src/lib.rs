//! Position replica and reconciliation against the venue.
//!
//! # Key Components
//!
//! - [`StateSynchronizer`]: single writer of the position replica, the DCA
//!   level and the balance; every other component reads snapshots
//! - [`Position`]: the replica, always overwritten from the venue report
//! - [`SyncOutcome`]: result of one reconciliation pass

pub mod error;
pub mod synchronizer;

pub use error::{PositionError, PositionResult};
pub use synchronizer::{
    accept_record, AcceptedRecord, DcaState, Position, PositionSnapshot, StateSynchronizer,
    SyncConfig, SyncOutcome,
};
