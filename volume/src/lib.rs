pub mod fault_injection;
pub mod join;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
