//! Backend-for-frontend for the distribution admin dashboard.
//!
//! Sits between the browser and the distribution REST backend: forwards the
//! caller's bearer token, shapes backend records into the dashboard's views
//! (filters, reconciliation, reports, exports, challans), and keeps product
//! and retailer writes queued while the backend is unreachable.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod services;
