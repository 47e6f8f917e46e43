pub mod build;
pub mod resolve;
pub mod version;
pub mod watch;
