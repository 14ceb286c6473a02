//! Drives order mutations against the backend.
//!
//! Every operation follows the same steps:
//! 1. refuse locally when the lifecycle rules say the action is illegal,
//! 2. mark `(action, order)` busy for the duration of the call,
//! 3. call the order service,
//! 4. on acknowledgment only, fold the outcome into the caller's copy.
//!
//! A failed call leaves the caller's order exactly as it was.

use chrono::Local;
use tracing::{info, warn};

use crate::{
    api::OrderService,
    busy::BusyFlags,
    errors::ClientError,
    lifecycle::{self, Action, Outcome, Role, StatusView},
    orders::{Order, Rating, UserId},
};

/// How a mutation reconciles local state with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Mutate locally first, revert if the server disagrees.
    Optimistic,
    /// Mutate locally only after the server acknowledged.
    ConfirmThenMutate,
}

pub struct OrderEngine<S> {
    service: S,
    viewer: Option<UserId>,
    busy: BusyFlags,
}

impl<S: OrderService> OrderEngine<S> {
    pub const STRATEGY: UpdateStrategy = UpdateStrategy::ConfirmThenMutate;

    pub fn new(service: S, viewer: Option<UserId>) -> Self {
        OrderEngine {
            service,
            viewer,
            busy: BusyFlags::new(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn viewer(&self) -> Option<UserId> {
        self.viewer
    }

    pub fn busy(&self) -> &BusyFlags {
        &self.busy
    }

    pub fn role(&self, order: &Order) -> Role {
        Role::of(self.viewer, order)
    }

    pub fn view(&self, order: &Order) -> StatusView {
        lifecycle::classify(order, self.role(order))
    }

    /// Whether the control for `action` on `order` should be disabled.
    pub fn is_busy(&self, action: Action, order: &Order) -> bool {
        self.busy.is_busy(action, &order.order_id)
    }

    pub async fn seller_confirm(&self, order: &mut Order) -> Result<(), ClientError> {
        self.run(order, Outcome::Confirmed).await
    }

    /// Cancels, or rejects when the seller does it before confirming.
    ///
    /// The reason is kept on the local copy only. The backend has no column
    /// for it, so a later [`reload`](Self::reload) brings back `None`.
    pub async fn cancel(&self, order: &mut Order, reason: Option<&str>) -> Result<(), ClientError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.run(
            order,
            Outcome::Cancelled {
                reason: reason.map(String::from),
            },
        )
        .await
    }

    pub async fn buyer_mark_complete(&self, order: &mut Order) -> Result<(), ClientError> {
        self.expect_role(order, Role::Buyer, Action::MarkComplete)?;
        self.run(order, Outcome::MarkedComplete).await
    }

    pub async fn seller_mark_complete(&self, order: &mut Order) -> Result<(), ClientError> {
        self.expect_role(order, Role::Seller, Action::MarkComplete)?;
        self.run(order, Outcome::MarkedComplete).await
    }

    /// Marks completion for whichever side the viewer is on.
    pub async fn mark_complete(&self, order: &mut Order) -> Result<(), ClientError> {
        self.run(order, Outcome::MarkedComplete).await
    }

    /// Rates the counterparty. A second rating by the same side is refused.
    pub async fn submit_rating(
        &self,
        order: &mut Order,
        rating: Rating,
    ) -> Result<(), ClientError> {
        self.run(order, Outcome::Rated(rating)).await
    }

    /// Replaces `order` with the server's current copy.
    pub async fn reload(&self, order: &mut Order) -> Result<(), ClientError> {
        let fresh = self.service.order_detail(&order.order_id).await?;
        *order = fresh;
        Ok(())
    }

    fn expect_role(
        &self,
        order: &Order,
        expected: Role,
        action: Action,
    ) -> Result<(), ClientError> {
        let role = self.role(order);
        if role == expected {
            return Ok(());
        }
        Err(lifecycle::LifecycleError::IllegalAction {
            action,
            role,
            status: order.order_status,
        }
        .into())
    }

    async fn run(&self, order: &mut Order, outcome: Outcome) -> Result<(), ClientError> {
        let role = self.role(order);
        let action = outcome.action();
        lifecycle::ensure_legal(order, role, action)?;

        let Some(_guard) = self.busy.try_acquire(action, &order.order_id) else {
            return Err(ClientError::Busy {
                action,
                order_id: order.order_id.clone(),
            });
        };

        match self.dispatch(order, role, &outcome).await {
            Ok(()) => {
                let now = Local::now().naive_local();
                lifecycle::apply(order, role, outcome, now)?;
                info!(
                    "{} {} order {} -> {}",
                    role, action, order.order_id, order.order_status
                );
                Ok(())
            }
            Err(ClientError::Malformed(detail)) => {
                warn!(
                    "unreadable acknowledgment for {} on order {}, reloading: {}",
                    action, order.order_id, detail
                );
                match self.service.order_detail(&order.order_id).await {
                    Ok(fresh) => *order = fresh,
                    Err(e) => warn!("reload of order {} failed: {}", order.order_id, e),
                }
                Err(ClientError::Malformed(detail))
            }
            Err(e) => {
                warn!("{} on order {} failed: {}", action, order.order_id, e);
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        order: &Order,
        role: Role,
        outcome: &Outcome,
    ) -> Result<(), ClientError> {
        let id = order.order_id.as_str();
        match (outcome, role) {
            (Outcome::Confirmed, _) => self.service.seller_confirm(id).await,
            (Outcome::Cancelled { reason }, _) => self.service.cancel(id, reason.as_deref()).await,
            (Outcome::MarkedComplete, Role::Buyer) => self.service.buyer_complete(id).await,
            (Outcome::MarkedComplete, _) => self.service.seller_complete(id).await,
            (Outcome::Rated(rating), Role::Buyer) => {
                self.service.buyer_rate_seller(id, *rating).await
            }
            (Outcome::Rated(rating), _) => self.service.seller_rate_buyer(id, *rating).await,
        }
    }
}
