pub mod categories;
pub mod client;
pub mod http;
pub mod request;
pub mod simulator;
