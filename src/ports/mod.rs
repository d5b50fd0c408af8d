pub mod expression;
pub mod file_system;
pub mod handler;
pub mod http_client;
pub mod scheduler;
