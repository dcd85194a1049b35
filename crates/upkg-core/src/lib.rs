//! This crate implements the core of upkg: reading versioned object packages,
//! linking their objects across packages and decompiling their bytecode.
//!
//! The usual entry point is [`Environment`]: load one or more packages into
//! it, then ask for objects, function scripts or whole classes as text.

#![allow(clippy::uninlined_format_args)]

pub mod archive;
pub mod build;
pub mod compression;
pub mod config;
pub mod decoder;
pub mod decompiler;
pub mod error;
pub mod index;
pub mod linker;
pub mod name;
pub mod object;
pub mod package;
pub mod provider;
pub mod script;
pub mod summary;
pub mod tables;

pub use error::{Error, Result};
pub use linker::Environment;
pub use package::{LoadOptions, Package, PackageId};
