// src/archive/mod.rs

//! Read side of the log archive.
//!
//! Workers upload each job's log pair to an object store after the run.
//! This module only reads it back:
//! - [`store`] defines the [`BlobStore`] trait and a directory-backed
//!   implementation.
//! - [`reader`] turns a job id prefix into a map of log files.

pub mod reader;
pub mod store;

pub use reader::{ArchiveSettings, LogArchiveReader, LogFile, LogFiles};
pub use store::{BlobInfo, BlobStore, DirectoryBlobStore};
