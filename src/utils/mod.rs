pub mod interpreter;
pub mod output;
pub mod port_checker;
pub mod process_killer;

pub use interpreter::*;
pub use output::*;
pub use port_checker::*;
pub use process_killer::*;
