pub mod auth;
pub mod campanile;
pub mod cli;
