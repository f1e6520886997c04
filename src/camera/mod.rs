pub mod aggregate;
pub mod connector;
pub mod health;
pub mod http_backend;
pub mod jpeg;
pub mod models;
pub mod probe;
pub mod reconnect;
pub mod registry;
pub mod service;
pub mod traits;

#[cfg(test)]
pub mod testing;
