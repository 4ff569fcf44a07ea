//! Document upload client.
//!
//! `upload` holds the multi-stage workflow (init, transfer, finalize, poll)
//! and its HTTP client, `documents` the document table column configuration,
//! and `app` the controller the `docupload` binary drives.

pub mod app;
pub mod config;
pub mod documents;
pub mod error;
pub mod upload;
pub mod utils;
