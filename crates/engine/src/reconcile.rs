//! Reconciliation against the authoritative remote cart.
//!
//! Three entry points share one fetch path: lazy initialization on first
//! access, an engine-owned periodic background revalidation task, and an
//! explicit on-demand sync (e.g. before checkout). Background passes set
//! `is_background_syncing`, never `is_loading`, and their failures are
//! logged and swallowed so background work never interrupts the user.
//! Overlapping fires are suppressed by a single in-flight flag: a duplicate
//! trigger is skipped, not queued.

use std::sync::atomic::Ordering;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use fresh_basket_core::{CartItemId, CartSnapshot};

use crate::engine::CartEngine;
use crate::error::EngineError;

impl CartEngine {
    /// Lazily fetch the cart on first access.
    ///
    /// No-op if the initial fetch already completed or another load is in
    /// flight; exactly one remote fetch executes no matter how many callers
    /// race here. This path sets `is_loading` on the snapshot while the
    /// fetch runs.
    ///
    /// # Errors
    ///
    /// Whatever the remote cart reports after retries. The failure is also
    /// surfaced on the snapshot's `error_message`.
    #[instrument(skip(self))]
    pub async fn ensure_initialized(&self) -> Result<(), EngineError> {
        if self.inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        if self
            .inner
            .sync_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("initial load already in flight, skipping");
            return Ok(());
        }

        let result = self.initial_load().await;
        self.inner.sync_in_flight.store(false, Ordering::Release);
        result
    }

    async fn initial_load(&self) -> Result<(), EngineError> {
        let _guard = self.inner.write_lock.lock().await;

        let mut loading = self.inner.store.current();
        loading.is_loading = true;
        self.inner.store.publish(loading);

        match self.fetch_authoritative().await {
            Ok(snapshot) => {
                self.inner.store.publish(snapshot);
                self.inner.initialized.store(true, Ordering::Release);
                info!("cart initialized");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "initial cart load failed");
                let mut current = self.inner.store.current();
                current.is_loading = false;
                self.inner
                    .store
                    .publish(current.with_error(error.user_message()));
                Err(error)
            }
        }
    }

    /// Silent fetch-and-replace from the authoritative remote cart.
    ///
    /// Used by the periodic background task and on-demand triggers (cart
    /// view, pre-checkout). Sets `is_background_syncing` but never
    /// `is_loading`, and never writes `error_message`. A concurrent sync
    /// already in flight makes this a no-op.
    ///
    /// # Errors
    ///
    /// Whatever the remote cart reports after retries; the existing
    /// snapshot is left in place.
    #[instrument(skip(self))]
    pub async fn sync_now(&self) -> Result<(), EngineError> {
        if self
            .inner
            .sync_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight, skipping");
            return Ok(());
        }

        let result = self.background_sync().await;
        self.inner.sync_in_flight.store(false, Ordering::Release);
        result
    }

    async fn background_sync(&self) -> Result<(), EngineError> {
        let _guard = self.inner.write_lock.lock().await;

        let mut syncing = self.inner.store.current();
        syncing.is_background_syncing = true;
        self.inner.store.publish(syncing);

        match self.fetch_authoritative().await {
            Ok(snapshot) => {
                self.inner.store.publish(snapshot);
                self.inner.initialized.store(true, Ordering::Release);
                debug!("background sync complete");
                Ok(())
            }
            Err(error) => {
                // Background work must not interrupt the user: log, restore
                // the flag, and keep the existing snapshot.
                warn!(error = %error, "background sync failed");
                let mut current = self.inner.store.current();
                current.is_background_syncing = false;
                self.inner.store.publish(current);
                Err(error)
            }
        }
    }

    /// Full authoritative fetch: items plus server-computed total and
    /// count. Caller must hold the write lock.
    ///
    /// Totals are re-derived from the fetched lines (the structural
    /// invariant); a disagreement with the server-computed figures is
    /// logged as staleness but the line items win.
    async fn fetch_authoritative(&self) -> Result<CartSnapshot, EngineError> {
        let timeout = self.inner.config.fetch_timeout;

        let items = self
            .inner
            .executor
            .execute("cart.fetch_all", timeout, || self.inner.gateway.fetch_all())
            .await?;
        let server_total = self
            .inner
            .executor
            .execute("cart.fetch_total", timeout, || {
                self.inner.gateway.fetch_total()
            })
            .await?;
        let server_count = self
            .inner
            .executor
            .execute("cart.fetch_count", timeout, || {
                self.inner.gateway.fetch_count()
            })
            .await?;

        let current = self.inner.store.current();
        let mut validating = current.validating_item_ids;
        validating.retain(|id| items.iter().any(|item| &item.id == id));

        let snapshot = self.settle(CartSnapshot {
            items,
            applied_coupon: current.applied_coupon,
            validating_item_ids: validating,
            ..CartSnapshot::empty()
        });

        if snapshot.total_price != server_total {
            warn!(local = %snapshot.total_price, server = %server_total, "server total disagrees with line items");
        }
        if snapshot.item_count != server_count {
            warn!(local = snapshot.item_count, server = server_count, "server count disagrees with line items");
        }

        Ok(snapshot)
    }

    // =========================================================================
    // Background revalidation lifecycle
    // =========================================================================

    /// Start the periodic background revalidation task.
    ///
    /// Owned by the engine, not by any UI component: call from session
    /// setup. Idempotent while a task is running.
    pub fn start(&self) {
        let mut slot = self
            .inner
            .revalidation
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let engine = self.clone();
        let interval = self.inner.config.revalidate_interval;
        info!(interval_secs = interval.as_secs(), "starting background revalidation");
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the first revalidation should
            // wait a full period
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Failures are logged inside sync_now and never surfaced.
                let _ = engine.sync_now().await;
            }
        }));
    }

    /// Stop the periodic background revalidation task. Call from session
    /// teardown. Idempotent.
    pub fn stop(&self) {
        let mut slot = self
            .inner
            .revalidation
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
            info!("stopped background revalidation");
        }
    }

    /// Tear down session state: stop revalidation and clear the snapshot.
    /// The next access will lazily re-initialize.
    pub async fn reset(&self) {
        self.stop();
        let _guard = self.inner.write_lock.lock().await;
        self.inner.initialized.store(false, Ordering::Release);
        self.inner.store.publish(CartSnapshot::empty());
        info!("cart engine reset");
    }

    // =========================================================================
    // Per-item validation marking
    // =========================================================================

    /// Mark items as being revalidated (stock/price recheck), so the UI can
    /// show a per-item busy indicator without blocking the rest of the
    /// cart. Idempotent.
    pub async fn start_item_validation(&self, ids: &[CartItemId]) {
        let _guard = self.inner.write_lock.lock().await;
        let mut next = self.inner.store.current();
        next.validating_item_ids.extend(ids.iter().cloned());
        self.inner.store.publish(next);
    }

    /// Unmark items as being revalidated. Idempotent.
    pub async fn stop_item_validation(&self, ids: &[CartItemId]) {
        let _guard = self.inner.write_lock.lock().await;
        let mut next = self.inner.store.current();
        for id in ids {
            next.validating_item_ids.remove(id);
        }
        self.inner.store.publish(next);
    }
}
