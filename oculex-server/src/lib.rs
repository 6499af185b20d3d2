//! # Oculex Server
//!
//! Session server for supervised clinical testing.
//!
//! ## Overview
//!
//! The server connects a doctor dashboard and a patient test runner:
//!
//! - **Real-time relay**: role-based websocket groups with per-event
//!   forwarding and enrichment, presence notifications included
//! - **Result ingest**: completed tests and clinician notes are appended to
//!   the category-partitioned result store
//! - **Patient history**: all stored rows for a patient, grouped by test
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - the JSON workbook result store from `oculex-core`
//! - per-connection mpsc channels feeding the websocket writer tasks
//! - environment-first configuration from `oculex-config`

pub mod handlers;
pub mod infra;
pub mod relay;
pub mod routes;

pub use infra::app_state::AppState;
