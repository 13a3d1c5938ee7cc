// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-size round-robin sandbox pool (C3, spec §4.3).

use crate::error::SandboxError;
use crate::sandbox::{CreateContext, Sandbox};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// `isolatePoolSize` (default 8) pre-warmed slots, handed out round-robin.
/// A simple counter modulo pool size gives even distribution and
/// predictable eviction behaviour (spec §9's design note) — a
/// least-recently-used policy was considered and rejected because slots
/// are stateless after release, so cache locality buys nothing.
///
/// Slots are claimed with an `AtomicBool` rather than a `Mutex<Option<..>>`
/// so an acquired [`Sandbox`] is *owned* by its [`PooledSandbox`] handle,
/// not held behind a lock guard — a caller needs to `.await` inside
/// `Sandbox::activate` while holding it, and a lock guard held across an
/// await point is both a correctness and a contention hazard.
pub struct SandboxPool {
    engine: Arc<wasmtime::Engine>,
    module: Arc<wasmtime::Module>,
    in_use: Vec<AtomicBool>,
    cursor: AtomicUsize,
    /// Behind a lock rather than a plain field so [`SandboxPool::destroy`]
    /// can take `&self` — the pool is shared via `Arc` with the pipeline,
    /// so teardown can never assume unique ownership.
    epoch_ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SandboxPool {
    /// Build a pool of `size` slots, each seeded against `module`. Starts a
    /// background ticker incrementing the engine epoch every `tick_period`
    /// — the clock behind `isolateExecutionTimeoutMs`'s hard wall-clock
    /// enforcement; a sandbox's `activate()` call computes its own epoch
    /// deadline in units of this tick.
    pub fn new(engine: Arc<wasmtime::Engine>, module: Arc<wasmtime::Module>, size: usize, tick_period: Duration) -> Self {
        let mut in_use = Vec::with_capacity(size);
        for _ in 0..size {
            in_use.push(AtomicBool::new(false));
        }

        let ticker_engine = engine.clone();
        let epoch_ticker = Mutex::new(Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_period);
            loop {
                interval.tick().await;
                ticker_engine.increment_epoch();
            }
        })));

        Self {
            engine,
            module,
            in_use,
            cursor: AtomicUsize::new(0),
            epoch_ticker,
        }
    }

    pub fn size(&self) -> usize {
        self.in_use.len()
    }

    /// `ticks_per_timeout` a freshly-created sandbox should pass to
    /// `Sandbox::activate`, given this pool's tick period and the
    /// configured `isolateExecutionTimeoutMs`.
    pub fn ticks_for_timeout(tick_period: Duration, timeout_ms: u64) -> u64 {
        let tick_ms = tick_period.as_millis().max(1) as u64;
        (timeout_ms / tick_ms).max(1)
    }

    /// Returns the next free slot round-robin; in the rare case every slot
    /// is occupied (group concurrency is sized to not exceed pool size per
    /// §4.3), returns `SandboxError::PoolExhausted` rather than blocking.
    ///
    /// Takes `self` wrapped in an `Arc` so the returned handle is `'static`
    /// and can be held by a per-group task (`worker-pipeline`) across
    /// `.await` points without borrowing the pool for the task's lifetime.
    pub fn acquire(self: &Arc<Self>, ctx: CreateContext) -> Result<PooledSandbox, SandboxError> {
        let size = self.in_use.len();
        for _ in 0..size {
            let index = self.cursor.fetch_add(1, Ordering::SeqCst) % size;
            if self.in_use[index]
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let sandbox = Sandbox::create(&self.engine, self.module.clone(), ctx)?;
                return Ok(PooledSandbox {
                    pool: self.clone(),
                    index,
                    sandbox: Some(sandbox),
                });
            }
        }
        Err(SandboxError::PoolExhausted(size))
    }

    /// `release()`: mark the slot free again. The sandbox itself is always
    /// discarded rather than returned, guaranteeing "never holds state from
    /// a prior workflow" without a bespoke in-place reset path.
    fn release(&self, index: usize) {
        self.in_use[index].store(false, Ordering::SeqCst);
    }

    /// `destroy()`: tear the whole pool down, called during `STOPPED`.
    /// Idempotent — stopping an already-stopped ticker is a no-op.
    pub fn destroy(&self) {
        if let Some(ticker) = self.epoch_ticker.lock().take() {
            ticker.abort();
        }
    }
}

impl Drop for SandboxPool {
    fn drop(&mut self) {
        if let Some(ticker) = self.epoch_ticker.lock().take() {
            ticker.abort();
        }
    }
}

/// A handle to an acquired slot, owning the [`Sandbox`] itself; releases
/// the slot back to the pool on drop so callers cannot forget to return
/// one, even on an early error return. Owns an `Arc<SandboxPool>` rather
/// than borrowing it, so it is `'static` and can be parked inside a
/// long-lived per-group task.
pub struct PooledSandbox {
    pool: Arc<SandboxPool>,
    index: usize,
    sandbox: Option<Sandbox>,
}

impl PooledSandbox {
    pub fn sandbox_mut(&mut self) -> &mut Sandbox {
        self.sandbox
            .as_mut()
            .unwrap_or_else(|| unreachable!("pooled sandbox taken while handle is live"))
    }
}

impl Drop for PooledSandbox {
    fn drop(&mut self) {
        if let Some(mut sandbox) = self.sandbox.take() {
            sandbox.dispose();
        }
        self.pool.release(self.index);
    }
}
