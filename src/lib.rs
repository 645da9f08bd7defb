pub mod api;
pub mod auth;
pub mod config;
pub mod data_models;
pub mod pagination;
pub mod retail;
