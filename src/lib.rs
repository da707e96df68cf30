pub mod db;
pub mod domain;
pub mod error;
pub mod notify;
pub mod routes;
pub mod service;
pub mod store;
