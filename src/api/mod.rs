//! API module - route assembly and local handlers

pub mod routes;
