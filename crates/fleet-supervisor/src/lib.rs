//! Periodic fleet supervision: sensor timeout scanning, fault detection,
//! risk prediction, and the failover/recovery triggers they feed.

pub mod config;
pub mod supervisor;
pub mod view;

pub use config::SupervisorConfig;
pub use supervisor::{Supervisor, TickReport};
pub use view::SupervisorView;
