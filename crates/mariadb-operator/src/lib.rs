pub mod config;
pub mod crds;
pub mod error;
pub mod mariadb_controller;
pub mod resources;
pub mod role;
pub mod secret;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;
