pub mod artifacts;
pub mod config;
pub mod devservice;
pub mod devui;
pub mod docker;
pub mod ipc;
pub mod locator;
pub mod microcks;
pub mod utils;

pub use config::{DevServiceConfig, GlobalConfig, LaunchContext, LaunchMode};
pub use devservice::{DevServiceError, DevServiceManager, ManagedState, RunningDevService, ShutdownHooks};
