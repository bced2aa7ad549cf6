mod roles;
mod runner;
mod shutdown;
mod state;
mod supervisor;

pub use roles::{ALL_ROLES, RoleSelection};
pub use runner::{RunOptions, run};
pub use shutdown::{ShutdownOptions, ShutdownSignal, wait_for_signal};
pub use state::{ServiceState, ServiceStatus};
pub use supervisor::{RoleRunner, RuntimeError, Supervisor};
