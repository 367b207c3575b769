pub mod backend_status;
pub mod process_info;

pub use backend_status::*;
pub use process_info::*;
