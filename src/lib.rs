//! Library crate for esports-mentions, exposing modules for binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod mention;
pub mod routes;
pub mod services;
pub mod state;
