//! Course checkout backend: purchase initiation, payment reconciliation and
//! the browser-side checkout poller.

pub mod api;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod identity;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
