pub mod api;
pub mod core;
pub mod session;
pub mod store;
