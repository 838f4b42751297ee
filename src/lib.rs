//! amistd: points ledger, reward catalog, redemption review and course
//! enrollment for the AmistApp school platform, served to the desktop
//! shell as a JSON-lines sidecar.

pub mod backup;
pub mod catalog;
pub mod courses;
pub mod db;
pub mod directory;
pub mod error;
pub mod events;
pub mod ipc;
pub mod ledger;
pub mod model;
pub mod redemption;
pub mod roles;
pub mod service;
pub mod store;
pub mod views;

pub use error::{AmistError, AmistResult, StoreError};
pub use events::{AmistEvent, EventSink, Outbox};
pub use ledger::NewTransaction;
pub use roles::{Capability, Role};
pub use service::{Amist, Clock, CodeSuffixSource, CoreConfig};
pub use store::{MemoryStore, SqliteStore, Store};
