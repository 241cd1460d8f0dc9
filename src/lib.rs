pub mod config;
pub mod error;
pub mod favourites;
pub mod lsof;
pub mod metadata;
pub mod sandbox;
pub mod server;
