pub mod serve;
pub mod stale;
pub mod status;
pub mod trigger;
pub mod watch;
