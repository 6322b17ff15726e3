pub mod assets;
pub mod billing;
pub mod config;
pub mod directory;
pub mod email;
pub mod renewals;
pub mod shared;
pub mod tickets;
