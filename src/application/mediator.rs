// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request dispatch with logging and timing.
//!
//! Every request passes through the same pipeline:
//!
//! 1. log the request name and payload
//! 2. run the handler
//! 3. warn if it took longer than the slow threshold
//! 4. log failures at error level

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use super::ApplicationError;

/// Requests slower than this are reported.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(500);

/// A command or query.
pub trait Request: Serialize + Send + Sync + 'static {
    type Response: Send;

    /// Name used in logs.
    const NAME: &'static str;
}

#[async_trait]
pub trait Handler<R: Request>: Send + Sync {
    async fn handle(&self, request: R) -> Result<R::Response, ApplicationError>;
}

pub struct Mediator<H> {
    handler: H,
    slow_threshold: Duration,
}

impl<H> Mediator<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            slow_threshold: SLOW_REQUEST_THRESHOLD,
        }
    }

    pub fn with_slow_threshold(mut self, slow_threshold: Duration) -> Self {
        self.slow_threshold = slow_threshold;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub async fn send<R>(&self, request: R) -> Result<R::Response, ApplicationError>
    where
        R: Request,
        H: Handler<R>,
    {
        let payload = serde_json::to_string(&request).unwrap_or_default();
        info!(request = R::NAME, payload = %payload, "Communications Request");

        let started = Instant::now();
        let result = self.handler.handle(request).await;
        let elapsed = started.elapsed();

        if elapsed > self.slow_threshold {
            warn!(
                request = R::NAME,
                elapsed_ms = elapsed.as_millis() as u64,
                payload = %payload,
                "Communications Long Running Request"
            );
        }
        if let Err(e) = &result {
            error!(request = R::NAME, error = %e, "Communications Request failed");
        }
        result
    }
}
