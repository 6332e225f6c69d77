// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mirrorline integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockTransport`] - Mock transport capturing threads, posts, and pins
//! - [`MockDirectory`] / [`MockEngine`] - Mock collaborators
//! - [`TestHarness`] - A fully wired relay on a temp SQLite database

pub mod harness;
pub mod mock_collaborators;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_collaborators::{MockDirectory, MockEngine};
pub use mock_transport::{CreatedThread, MockTransport, PostedMessage};
