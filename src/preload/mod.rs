pub mod manager;
pub mod probe;
pub mod service;
pub mod session;
