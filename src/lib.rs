//! SIF Library Client
//!
//! This file serves as the library root for the sif-library-client crate, organizing and
//! exposing the modules that move SIF images to and from a library service, either over its
//! OCI registry or over the library's own image file protocol.

pub mod cli;
pub mod client;
pub mod concurrency;
pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod legacy;
pub mod logging;
pub mod registry;
pub mod upload;

pub use client::{LibraryClient, LibraryClientBuilder, MetadataStore, PushRequest};
pub use config::ClientConfig;
pub use digest::Digest;
pub use error::{LibraryError, Result};
pub use logging::Logger;
