//! CareLink domain core.
//!
//! Pure logic with no I/O: roles and permissions, blood-pressure
//! classification and validation, and role-aware notification payloads.

pub mod blood_pressure;
pub mod error;
pub mod event_types;
pub mod notification;
pub mod roles;
pub mod staff;
pub mod types;
pub mod validation;
