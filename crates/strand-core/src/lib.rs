//! Strand Core - shared foundation for the strand command-line tool.
//!
//! This crate provides:
//! - Home and workspace directory resolution ([`dirs`])
//! - The host version string handed to plugins

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod dirs;

pub use dirs::{StrandHome, WorkspaceDir};

/// Version of the host tool, exposed to plugins through their install context.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short name of the host tool. Used for naming conventions and file names.
pub const TOOL_NAME: &str = "strand";
