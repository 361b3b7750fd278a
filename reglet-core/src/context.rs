// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation context, threaded through the engine, worker
//! pool, and retry backoff (spec.md §5 "Suspension points").
//!
//! Every suspension point selects on (timer, context) rather than sleeping
//! unconditionally, per the Design Notes in spec.md §9.

use crate::errors::CancellationKind;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// A cheaply cloneable cancellation/deadline handle.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// A child context that additionally expires at `timeout` from now,
    /// whichever of the two deadlines is sooner (spec.md §4.9 per-control
    /// timeout, "applied around executeControl's observations via a
    /// derived context").
    pub fn with_derived_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(existing) => existing.min(candidate),
            None => candidate,
        };
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(self.inner.cancelled.load(Ordering::SeqCst)),
                deadline: Some(deadline),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns `Err` if the context is already canceled or expired,
    /// distinguishing the two per spec.md §4.9 step 1.
    pub fn check(&self) -> Result<(), CancellationKind> {
        if self.is_cancelled() {
            Err(CancellationKind::Canceled)
        } else if self.is_expired() {
            Err(CancellationKind::TimedOut)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, or returns early with the reason if the
    /// context is canceled or its deadline arrives first.
    pub async fn sleep_or_cancelled(&self, duration: Duration) -> Result<(), CancellationKind> {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            if let Err(reason) = self.check() {
                return Err(reason);
            }
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(10)) => continue,
            }
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
