//! Trigger surface: HTTP endpoints that start a dispatch run and expose the
//! queue's dead-letter sink and statistics.

pub mod app;
