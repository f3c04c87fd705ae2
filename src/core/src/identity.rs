//! Sensor identity supplied by the credential manager.

pub mod identity_context;

pub use identity_context::IdentityContext;
