pub mod catalog;
pub mod dispatcher;
pub mod filter;
pub mod protocol;
pub mod server;
