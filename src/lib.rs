pub mod client;
pub mod config;
pub mod handlers;
pub mod net;
pub mod poll;
pub mod presence;
pub mod request;
pub mod send;
pub mod store;
pub mod transport;
pub mod types;
