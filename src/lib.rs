//! MusicBox server library.
//!
//! Converts YouTube videos into MP3 files, keeps them in a short-lived
//! staging area and promotes the ones worth keeping into a SQLite-backed
//! library that can be streamed back.

pub mod background_jobs;
pub mod config;
pub mod extractor;
pub mod library;
pub mod pipeline;
pub mod server;
pub mod sqlite_persistence;
pub mod staging;
pub mod validation;
