pub mod config_service;
pub mod error;
pub mod repos;
pub mod resolver;
