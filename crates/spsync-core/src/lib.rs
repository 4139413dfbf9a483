//! spsync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `CandidateFile`, `RemoteEntry`, `SyncDecision`, `UploadResult`, `OrphanCandidate`
//! - **Port definitions** - Traits for adapters: `IRemoteLibrary`, `IContentTransform`
//! - **Statistics** - The run-wide `SyncStats` accumulator
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! The domain module holds pure data and rules (path normalization, name
//! sanitization, state transitions) with no I/O. Ports define trait
//! interfaces that adapter crates implement; the sync engine in
//! `spsync-sync` drives them.

pub mod config;
pub mod domain;
pub mod ports;
pub mod stats;
