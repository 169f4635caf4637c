// ABOUTME: Shared HTTP test helpers for route integration tests
// ABOUTME: Exports the in-process axum request builder
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod axum_test;
