// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration document model for the gicli integration runner.
//!
//! A group document describes one or more origins (remote services), each
//! carrying an ordered list of declarative jobs. This crate provides:
//! - serde types for the document shape (`Group`, `Origin`, `Job`, `Output`)
//! - document-level validation that collects every violation at once
//! - dotted-path navigation over `serde_json::Value` with `[n]` indices

pub mod document;
pub mod paths;
pub mod validate;

pub use document::{
    AuthOptions, Group, Job, JobMode, JobType, Origin, Output, OutputKind, ResponseFormat,
    RetryPolicy,
};
pub use paths::{coerce_indexed_object, lookup_path};
pub use validate::{ValidationIssue, validate_group};
