//! Raw LevelDB record supply
//!
//! The LevelDB log and table reader is an external collaborator. This module
//! only fixes the shape of what it hands over: every versioned entry ever
//! written to the store, deleted ones included, in no particular order.

mod record;

pub use record::{KeyState, RawRecord};
