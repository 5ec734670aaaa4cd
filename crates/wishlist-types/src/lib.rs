//! Types shared between the HTTP layer, the live-view gateway and storage.

pub mod api;
pub mod models;
