pub mod config;
pub mod dispatch;
pub mod init;
pub mod log;
pub mod schema;
pub mod show;
