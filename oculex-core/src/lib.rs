//! # Oculex Core
//!
//! Core library for the Oculex supervised-testing server, providing the
//! result store, category schemas, and the session wire protocol shared
//! between the relay server and satellite test runners.
//!
//! ## Overview
//!
//! - **Result store**: append-only, category-partitioned tabular records
//!   keyed by patient name, with schema-driven row construction and
//!   patient-scoped history retrieval.
//! - **Session events**: the websocket message types exchanged between the
//!   doctor dashboard and the patient test runner.
//! - **Delivery client**: best-effort submission of finished test results
//!   from a satellite runner to the central gateway.

pub mod delivery;
pub mod error;
pub mod session;
pub mod store;

pub use delivery::{DeliveryError, ResultDelivery};
pub use error::{Result, StoreError};
pub use session::{EventPayload, Role, SessionEvent};
pub use store::{ResultStore, schema::TestCategory};
