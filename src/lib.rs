pub mod assets;
pub mod bhajan;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod io;
pub mod lifecycle;
pub mod mime_type;
pub mod normalization;
pub mod routes;
pub mod store;
pub mod urls;
