// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! gicli-core — job orchestration kernel for the declarative HTTP
//! integration runner.
//!
//! The kernel is composed of explicit, orchestrator-constructed components
//! (no global singletons):
//! - [`session::SessionStore`] — TTL'd key→value store for issued tokens
//! - [`substitute::Substitutor`] — placeholder expansion over strings and
//!   nested structures
//! - [`resolver`] — topological ordering of a job's dependency closure
//! - [`http::HttpClient`] — single-request client with retry and parsing
//! - [`auth::Authenticator`] — login lifecycle and token storage
//! - [`sink`] — file and SQL Server response destinations
//! - [`executor::JobExecutor`] — per-job state machine with the 401 replay
//! - [`orchestrator::Orchestrator`] — the sequential run loop

pub mod auth;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod http;
pub mod orchestrator;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod substitute;
pub mod xml;

pub use cache::{InvocationCache, JobResult};
pub use crypto::{ENC_PREFIX, SecretBox, generate_master_key};
pub use error::{CoreError, Result};
pub use http::{HttpClient, HttpResponse, RequestOptions, ResponseBody};
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
pub use session::SessionStore;
pub use substitute::Substitutor;
