pub mod config;
pub mod event_bus;
pub mod host;
pub mod net;
pub mod persistence;
pub mod player_registry;
pub mod profile_lookup;
pub mod usercache;
