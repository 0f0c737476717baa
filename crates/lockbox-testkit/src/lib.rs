//! # Lockbox Testkit
//!
//! Testing utilities for Lockbox.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a real server on a free loopback port, and clients whose
//!   keys are already published to it
//! - **Generators**: Proptest strategies for identities, file names and
//!   request scripts
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use lockbox_testkit::fixtures::TestServer;
//!
//! # async fn example() -> lockbox::Result<()> {
//! let server = TestServer::start().await?;
//! let alice = server.client("alice");
//! alice.add_user().await?;
//! alice.upload_file("notes.txt", b"hello".to_vec()).await?;
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use lockbox_testkit::generators::request_script;
//!
//! const USERS: &[&str] = &["alice", "bob"];
//!
//! proptest! {
//!     #[test]
//!     fn owners_can_always_read(script in request_script(USERS, 32)) {
//!         // replay the script against a registry...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{identity, keys_for, seed_for, test_config, TestServer};
pub use generators::{file_data, filename, request, request_script};
