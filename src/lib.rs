pub mod app;
pub mod app_state_builder;
pub mod authz;
pub mod classify;
pub mod config;
pub mod confirm;
pub mod desktop;
pub mod error;
pub mod gate;
pub mod identity;
pub mod ingest;
pub mod policy_store;
pub mod routes;
pub mod server_config;
pub mod state;
pub mod storage;
