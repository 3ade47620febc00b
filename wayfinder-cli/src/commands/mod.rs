pub mod fetch;
pub mod lease;
pub mod resolve;

pub use fetch::run_fetch;
pub use lease::{run_cancel, run_heartbeat, run_register};
pub use resolve::run_resolve;
