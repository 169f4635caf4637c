// ABOUTME: Passwordless login by one-time code sent to an email address or phone
// ABOUTME: Session management plus OTP issuance and verification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

/// OTP generation, delivery and verification
pub mod otp;
/// Login session lifecycle
pub mod sessions;

pub use otp::{CodeGenerator, OtpIssuer, OtpSender, RandomCodeGenerator, TracingOtpSender};
pub use sessions::SessionManager;
