pub mod backup;
pub mod claims;
pub mod core;
pub mod courses;
pub mod events;
pub mod ledger;
pub mod rewards;
pub mod setup;
pub mod users;
pub mod views;
