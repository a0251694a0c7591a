//! fsroot: file operations confined to one root directory.
//!
//! Every caller-supplied path is resolved through [`sandbox::PathSandbox`]
//! before anything touches the filesystem. On top of that sit directory
//! listing, a trash with restore metadata, recursive copy and delete, and
//! archive compression and extraction. [`manager::FileManager`] is the
//! synchronous facade; [`service::Dispatcher`] runs JSON requests against it
//! on blocking workers.

pub mod archive;
pub mod commands;
pub mod config;
pub mod error;
pub mod listing;
pub mod manager;
pub mod ops;
pub mod sandbox;
pub mod service;
pub mod trash;

pub use config::RootConfig;
pub use error::{FsError, Result};
pub use manager::FileManager;
pub use sandbox::PathSandbox;
pub use service::{Dispatcher, Request, Response, Status};
