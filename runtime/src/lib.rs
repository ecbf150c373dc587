// Copyright 2026 Trendline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Trendline: resilient extraction of an interest-over-time series.
//!
//! A run opens one browser session, drives the explore page to a rendered
//! chart (rerouting once if the site blocks us), pulls raw rows through an
//! ordered strategy chain, normalizes them and writes a small JSON artifact.
//! Any fatal failure leaves a screenshot and page dump behind.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extraction;
pub mod navigation;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod renderer;
pub mod session;
pub mod stealth;

pub use error::{ErrorKind, ScrapeError};
pub use pipeline::{Pipeline, PipelineResult};
