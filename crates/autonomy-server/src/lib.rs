//! The HTTP API: a thin read/write surface over the Approval
//! Workflow and the store's goal/project/outcome views, plus a status
//! endpoint for the Resource Gate's current admissibility signals. Every
//! handler translates `AutonomyError` into a stable `error` code rather
//! than leaking an internal message.

mod http;

pub use http::{app_router, serve, AppState};
