pub mod analysis;
pub mod data;
pub mod link;
pub mod monitor;
pub mod proto;
pub mod view;

pub use data::{History, Snapshot, TelemetrySample};
pub use link::{Connection, ConnectionState};
pub use monitor::{Scheduler, Session};
