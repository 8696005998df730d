//! Sagebrush Core - Shared domain types and rules.
//!
//! This crate provides the pieces of Sagebrush Commerce that do not need a
//! database or network to be correct:
//! - typed entity IDs, validated emails and integer money
//! - status enums together with their allowed transitions
//! - membership tier qualification and loyalty points arithmetic
//! - read-time scheduling checks for storefront banners
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. The server crate loads rows from
//! `PostgreSQL` and hands them to these rules, so the rules can be tested
//! without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, and statuses
//! - [`loyalty`] - Tier evaluation and points ledger math
//! - [`schedule`] - Active/date-range checks for scheduled content

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod loyalty;
pub mod schedule;
pub mod types;

pub use types::*;
