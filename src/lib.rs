#![deny(missing_docs)]
//! Automated check-in engine for reward-dispensing Telegram bots.
//!
//! Drives one check-in conversation per (account, target bot) pair: sends the
//! trigger command, classifies the bot's replies, answers menu prompts,
//! resolves captcha images through an external OCR collaborator, and reports
//! one terminal outcome per pair within a bounded run deadline.

/// Check-in conversation engine.
pub mod checkin;
/// Configuration management.
pub mod config;
/// Captcha OCR collaborator interface.
pub mod ocr;
/// Chat transport interface and Telegram implementation.
pub mod transport;
/// Utility functions.
pub mod utils;
