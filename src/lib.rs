// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Embeddable API documentation probe for HTTP services.
//!
//! This library provides the core functionality for probe-http, including
//! route scanning, schema inference, the dual-layer documentation store,
//! live traffic capture, request execution and the mounted tool API.

pub mod api;
pub mod capture;
pub mod config;
pub mod executor;
pub mod interceptor;
pub mod model;
pub mod scanner;
pub mod schema;
pub mod service;
pub mod store;
pub mod vars;

pub use config::Options;
pub use service::ApiProbe;

// Keep library small; main.rs remains the demo binary entrypoint.
