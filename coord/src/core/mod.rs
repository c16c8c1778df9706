pub mod health;
pub mod meta;
pub mod node;
pub mod op;
pub mod placement;
pub mod routes;
pub mod server;
pub mod state;
