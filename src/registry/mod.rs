//! OCI registry interactions
//!
//! Credentials and challenge parsing live in [`auth`]; the HTTP operations are grouped under
//! [`operations`] and composed by [`RegistryClient`].

pub mod auth;
pub mod client;
pub mod operations;

pub use auth::{AccessType, AuthChallenge, AuthScheme, Credential};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use operations::OciAccess;
