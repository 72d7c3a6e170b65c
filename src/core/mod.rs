pub mod config;
pub mod constants;
pub mod events;
pub mod explorer;
pub mod geo;
pub mod location;
pub mod state;
pub mod viewport;
