pub mod archive;
pub mod cleanup;
pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod release;
pub mod runtime;
pub mod toolchain;

pub use error::ProvisionError;
pub use install::{Provisioner, provision};
