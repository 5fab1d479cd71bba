//! Middleware module - request admission layers

pub mod rate_limit;
