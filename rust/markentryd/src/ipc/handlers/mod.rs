pub mod core;
pub mod entries;
pub mod export;
pub mod roster;
pub mod schema;
pub mod session;
pub mod setup;
