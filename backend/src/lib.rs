pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod inference;
pub mod models;
pub mod routes;
pub mod storage;
pub mod upload;
