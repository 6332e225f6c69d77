// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the durable store's tables.

pub mod configs;
pub mod jobs;
pub mod shadow;
pub mod threads;
pub mod user_states;
