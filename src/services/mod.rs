pub mod credentials;
pub mod invoker;
pub mod middleware;
pub mod token_store;
pub mod tool_handler;
pub mod transport;
