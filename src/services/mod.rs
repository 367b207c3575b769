pub mod backend_config;
pub mod backend_process;
pub mod exit_guard;
pub mod health;
pub mod status_cell;
pub mod supervisor;

pub use backend_config::*;
pub use backend_process::*;
pub use exit_guard::*;
pub use health::*;
pub use status_cell::*;
pub use supervisor::*;
