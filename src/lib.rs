pub mod browser;
pub mod cli;
pub mod core;
pub mod daemon;
pub mod http;
pub mod registry;
pub mod selector;
pub mod tree;

pub use crate::core::config::LaunchOptions;
pub use crate::core::state::InstanceState;
pub use crate::daemon::DaemonState;
pub use crate::registry::Registry;
