//! Status enums are defined in `raffle-core` so that pure logic can use
//! them; re-exported here for repository code.

pub use raffle_core::status::{IntentStatus, RaffleStatus, StatusId};
