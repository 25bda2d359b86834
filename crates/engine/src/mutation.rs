//! Optimistic cart mutations.
//!
//! Every mutation captures the snapshot current at call time as its rollback
//! baseline, publishes the optimistic replacement immediately, then confirms
//! against the remote cart through the resilient executor. On terminal or
//! retry-exhausted failure the baseline is restored with a user-facing error
//! message. The engine's write lock is held across the whole operation, so
//! writers form a total order and a settled snapshot never contains a
//! placeholder ID.
//!
//! A mutation on a cart that has not loaded yet first awaits the lazy
//! initial fetch, so baselines, merge decisions, and the stock gate always
//! see the authoritative server lines.

use tracing::{info, instrument, warn};

use fresh_basket_core::{CartItem, CartItemId, CartSnapshot, CouponCode, ProductId};
use rust_decimal::Decimal;

use crate::coupon::CouponEngine;
use crate::engine::CartEngine;
use crate::error::EngineError;

impl CartEngine {
    /// Add `quantity` units of a product.
    ///
    /// If the product already has a line, its quantity is incremented; the
    /// cart never holds two lines for one product. New lines carry a
    /// placeholder ID until the server confirms the canonical item.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero quantity or insufficient stock, otherwise
    /// whatever the catalog or remote cart reports after retries.
    #[instrument(skip(self))]
    pub async fn add_item(&self, product_id: ProductId, quantity: u32) -> Result<(), EngineError> {
        if quantity == 0 {
            return Err(EngineError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        self.ensure_initialized().await?;

        let _guard = self.inner.write_lock.lock().await;
        let baseline = self.inner.store.current();

        let product = match self.resolve_product(product_id).await {
            Ok(product) => product,
            Err(error) => {
                // Nothing was published yet; only surface the message.
                self.inner
                    .store
                    .publish(baseline.with_error(error.user_message()));
                return Err(error);
            }
        };

        let desired = baseline
            .find_by_product(product_id)
            .map_or(0, |line| line.quantity)
            + quantity;
        if !product.has_stock_for(desired) {
            let error = EngineError::Validation("Not enough stock available".to_string());
            self.inner
                .store
                .publish(baseline.with_error(error.user_message()));
            return Err(error);
        }

        let mut optimistic = baseline.clone().without_error();
        if let Some(line) = optimistic
            .items
            .iter_mut()
            .find(|line| line.product_id == product_id)
        {
            line.quantity = desired;
            // Pick up any price change the catalog has seen since the line
            // was added.
            line.unit_price = product.price;
            line.discounted_unit_price = product.effective_price();
        } else {
            optimistic.items.push(CartItem::pending(&product, quantity));
        }
        self.inner.store.publish(self.settle(optimistic));

        let result = self
            .inner
            .executor
            .execute("cart.add", self.inner.config.mutation_timeout, || {
                self.inner.gateway.add(product_id, quantity)
            })
            .await;

        match result {
            Ok(confirmed) => {
                let mut settled = self.inner.store.current();
                if let Some(line) = settled
                    .items
                    .iter_mut()
                    .find(|line| line.product_id == product_id)
                {
                    // Swap in the canonical ID; totals are already correct.
                    line.id = confirmed.id;
                }
                self.inner.store.publish(settled);
                info!(%product_id, quantity, "item added");
                Ok(())
            }
            Err(error) => {
                warn!(%product_id, error = %error, "add failed, rolling back");
                self.rollback_to(baseline, &error);
                Err(error)
            }
        }
    }

    /// Remove a line item.
    ///
    /// # Errors
    ///
    /// `NotFound` if the ID is absent (the snapshot is left untouched),
    /// otherwise whatever the remote cart reports after retries.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: &CartItemId) -> Result<(), EngineError> {
        self.ensure_initialized().await?;

        let _guard = self.inner.write_lock.lock().await;
        let baseline = self.inner.store.current();

        if baseline.find_item(item_id).is_none() {
            return Err(EngineError::NotFound("Cart item".to_string()));
        }

        let mut optimistic = baseline.clone().without_error();
        optimistic.items.retain(|line| &line.id != item_id);
        optimistic.validating_item_ids.remove(item_id);
        self.inner.store.publish(self.settle(optimistic));

        let result = self
            .inner
            .executor
            .execute("cart.remove", self.inner.config.mutation_timeout, || {
                self.inner.gateway.remove(item_id)
            })
            .await;

        match result {
            Ok(()) => {
                info!(%item_id, "item removed");
                Ok(())
            }
            Err(error) => {
                warn!(%item_id, error = %error, "remove failed, rolling back");
                self.rollback_to(baseline, &error);
                Err(error)
            }
        }
    }

    /// Replace a line item's quantity.
    ///
    /// Quantity 0 is not a valid input; callers must use
    /// [`remove_item`](Self::remove_item) to delete a line.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero quantity or insufficient stock, `NotFound`
    /// if the ID is absent (the snapshot is left untouched), otherwise
    /// whatever the remote cart reports after retries.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        item_id: &CartItemId,
        quantity: u32,
    ) -> Result<(), EngineError> {
        if quantity == 0 {
            return Err(EngineError::Validation(
                "Quantity must be at least 1; use remove_item to delete a line".to_string(),
            ));
        }
        self.ensure_initialized().await?;

        let _guard = self.inner.write_lock.lock().await;
        let baseline = self.inner.store.current();

        let Some(line) = baseline.find_item(item_id) else {
            return Err(EngineError::NotFound("Cart item".to_string()));
        };
        let product_id = line.product_id;

        let product = match self.resolve_product(product_id).await {
            Ok(product) => product,
            Err(error) => {
                self.inner
                    .store
                    .publish(baseline.with_error(error.user_message()));
                return Err(error);
            }
        };
        if !product.has_stock_for(quantity) {
            let error = EngineError::Validation("Not enough stock available".to_string());
            self.inner
                .store
                .publish(baseline.with_error(error.user_message()));
            return Err(error);
        }

        let mut optimistic = baseline.clone().without_error();
        if let Some(line) = optimistic
            .items
            .iter_mut()
            .find(|line| &line.id == item_id)
        {
            line.quantity = quantity;
            line.unit_price = product.price;
            line.discounted_unit_price = product.effective_price();
        }
        self.inner.store.publish(self.settle(optimistic));

        let result = self
            .inner
            .executor
            .execute("cart.update", self.inner.config.mutation_timeout, || {
                self.inner.gateway.update_quantity(item_id, quantity)
            })
            .await;

        match result {
            Ok(_confirmed) => {
                info!(%item_id, quantity, "quantity updated");
                Ok(())
            }
            Err(error) => {
                warn!(%item_id, error = %error, "update failed, rolling back");
                self.rollback_to(baseline, &error);
                Err(error)
            }
        }
    }

    /// Remove every line item.
    ///
    /// Not optimistic: clearing is destructive, so the remote call comes
    /// first and the snapshot is only replaced on success.
    ///
    /// # Errors
    ///
    /// Whatever the remote cart reports after retries; the existing
    /// snapshot is preserved on failure.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), EngineError> {
        self.ensure_initialized().await?;

        let _guard = self.inner.write_lock.lock().await;
        let baseline = self.inner.store.current();

        let result = self
            .inner
            .executor
            .execute("cart.clear", self.inner.config.mutation_timeout, || {
                self.inner.gateway.clear()
            })
            .await;

        match result {
            Ok(()) => {
                self.inner.store.publish(CartSnapshot::empty());
                info!("cart cleared");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "clear failed, keeping existing snapshot");
                self.inner
                    .store
                    .publish(baseline.with_error(error.user_message()));
                Err(error)
            }
        }
    }

    /// Apply a coupon code against the current order total.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Validation` from coupon rules; cart items are never
    /// touched by a coupon failure.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn apply_coupon(&self, code: &CouponCode) -> Result<(), EngineError> {
        self.ensure_initialized().await?;

        let _guard = self.inner.write_lock.lock().await;
        let current = self.inner.store.current();

        match self.inner.coupons.validate(code, current.total_price).await {
            Ok(coupon) => {
                let discount = CouponEngine::calculate_discount(&coupon, current.total_price);
                let mut next = current.without_error();
                next.applied_coupon = Some(coupon);
                next.applied_discount = discount;
                self.inner.store.publish(next);
                info!(%code, %discount, "coupon applied");
                Ok(())
            }
            Err(coupon_error) => {
                let error = EngineError::from(coupon_error);
                self.inner
                    .store
                    .publish(current.with_error(error.user_message()));
                Err(error)
            }
        }
    }

    /// Remove the applied coupon. Local-only, never fails.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self) {
        let _guard = self.inner.write_lock.lock().await;
        let mut next = self.inner.store.current().without_error();
        next.applied_coupon = None;
        next.applied_discount = Decimal::ZERO;
        self.inner.store.publish(next);
    }

    /// Restore the rollback baseline with the error's user-facing message.
    ///
    /// Local-only failures leave the optimistic state in place (nothing
    /// diverged remotely) and only surface the message.
    fn rollback_to(&self, baseline: CartSnapshot, error: &EngineError) {
        if error.is_local() {
            let current = self.inner.store.current();
            self.inner
                .store
                .publish(current.with_error(error.user_message()));
        } else {
            self.inner
                .store
                .publish(baseline.with_error(error.user_message()));
        }
    }
}
