//! Administrative control plane: request types, authorization, audit trail,
//! and the service facade consumed by the HTTP layer.

pub mod admin;
