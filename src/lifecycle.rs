//! The order lifecycle rules, kept free of I/O.
//!
//! Every view that renders an order asks this module the same three questions:
//! - who is looking at it ([`Role::of`]),
//! - what that viewer may do next and how the status reads to them ([`classify`]),
//! - what the order looks like after the server accepted an action ([`apply`]).
//!
//! List and detail views never branch on raw `(status, flags)` themselves.

use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::orders::{Credit, Order, OrderStatus, Rating, UserId};

/// The viewer's relationship to an order.
///
/// Derived by comparing the viewer's id with the order's buyer and seller.
/// A viewer that is neither only gets a read-only view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Buyer,
    Seller,
    Observer,
}

impl Role {
    /// Derives the role of `viewer` on `order`.
    ///
    /// An order whose buyer and seller are the same account cannot be created
    /// by the backend; should one show up anyway it is treated as read-only.
    pub fn of(viewer: Option<UserId>, order: &Order) -> Role {
        let Some(id) = viewer else {
            return Role::Observer;
        };
        let is_buyer = order.buyer.user_id == id;
        let is_seller = order.seller.user_id == id;
        match (is_buyer, is_seller) {
            (true, false) => Role::Buyer,
            (false, true) => Role::Seller,
            _ => Role::Observer,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Role::Buyer => "Buyer",
            Role::Seller => "Seller",
            Role::Observer => "Observer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Observer => "observer",
        })
    }
}

/// A mutating operation a party can trigger on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Confirm,
    Cancel,
    MarkComplete,
    Rate,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Confirm,
        Action::Cancel,
        Action::MarkComplete,
        Action::Rate,
    ];

    fn bit(self) -> u8 {
        match self {
            Action::Confirm => 1,
            Action::Cancel => 1 << 1,
            Action::MarkComplete => 1 << 2,
            Action::Rate => 1 << 3,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Confirm => "confirm",
            Action::Cancel => "cancel",
            Action::MarkComplete => "mark complete",
            Action::Rate => "rate",
        })
    }
}

/// A small set of [`Action`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionSet(u8);

impl ActionSet {
    pub fn empty() -> Self {
        ActionSet(0)
    }

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = ActionSet::empty();
        for action in iter {
            set.insert(action);
        }
        set
    }
}

/// The classification every label and every gate is derived from.
///
/// `AwaitingMutual { buyer_done: true, seller_done: true }` is transient: the
/// second completion lands the order on `Completed` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingSeller,
    Confirmed,
    AwaitingMutual { buyer_done: bool, seller_done: bool },
    Completed,
    Cancelled,
}

impl Phase {
    pub fn of(order: &Order) -> Phase {
        match order.order_status {
            OrderStatus::PendingSellerConfirmation => Phase::AwaitingSeller,
            OrderStatus::Confirmed => Phase::Confirmed,
            OrderStatus::AwaitingMutualCompletion => Phase::AwaitingMutual {
                buyer_done: order.if_buyer_confirm,
                seller_done: order.if_seller_confirm,
            },
            OrderStatus::Completed => Phase::Completed,
            OrderStatus::Cancelled => Phase::Cancelled,
        }
    }

    /// Whether `role` has already marked its side of the hand-over complete.
    fn done_by(self, role: Role) -> bool {
        match (self, role) {
            (Phase::AwaitingMutual { buyer_done, .. }, Role::Buyer) => buyer_done,
            (Phase::AwaitingMutual { seller_done, .. }, Role::Seller) => seller_done,
            (Phase::Completed, Role::Buyer | Role::Seller) => true,
            _ => false,
        }
    }
}

/// What a viewer sees for one order: the shared classification, the status
/// label in the viewer's own wording and the actions they may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub role: Role,
    pub phase: Phase,
    pub label: String,
    pub actions: ActionSet,
}

pub fn classify(order: &Order, role: Role) -> StatusView {
    StatusView {
        role,
        phase: Phase::of(order),
        label: describe_status(order, role),
        actions: legal_actions(order, role),
    }
}

/// The actions `role` may take on `order` right now.
///
/// | phase | seller | buyer |
/// |---|---|---|
/// | awaiting seller | confirm, cancel (reject) | cancel |
/// | confirmed | mark complete, cancel | mark complete, cancel |
/// | awaiting mutual | mark complete, cancel unless done | mark complete unless done, cancel |
/// | completed | rate unless rated | rate unless rated |
/// | cancelled | – | – |
///
/// The seller loses cancel once they have marked completion. The buyer keeps
/// it until both sides have, since the order is then about to land on
/// `Completed`.
pub fn legal_actions(order: &Order, role: Role) -> ActionSet {
    let phase = Phase::of(order);
    let mut actions = ActionSet::empty();

    if role == Role::Observer {
        return actions;
    }

    match phase {
        Phase::AwaitingSeller => {
            actions.insert(Action::Cancel);
            if role == Role::Seller {
                actions.insert(Action::Confirm);
            }
        }
        Phase::Confirmed | Phase::AwaitingMutual { .. } => {
            if !phase.done_by(role) {
                actions.insert(Action::MarkComplete);
            }
            let converging = phase.done_by(Role::Buyer) && phase.done_by(Role::Seller);
            let may_cancel = match role {
                Role::Buyer => !converging,
                _ => !phase.done_by(Role::Seller),
            };
            if may_cancel {
                actions.insert(Action::Cancel);
            }
        }
        Phase::Completed => {
            if own_rating(order, role).is_none() {
                actions.insert(Action::Rate);
            }
        }
        Phase::Cancelled => {}
    }
    actions
}

/// The rating `role` has given its counterparty, if any.
///
/// The buyer rates the seller (`seller_credit`), the seller rates the buyer
/// (`buyer_credit`).
pub fn own_rating(order: &Order, role: Role) -> Option<Credit> {
    match role {
        Role::Buyer => order.seller_credit,
        Role::Seller => order.buyer_credit,
        Role::Observer => None,
    }
}

/// Short status label as `role` should read it.
///
/// Buyer and seller read mirrored phrasings of the same flag state: the party
/// that already completed sees "Waiting for <other>", the other one sees
/// "<Other> confirmed". Observers (and the neutral detail header) get a
/// description naming both sides.
pub fn describe_status(order: &Order, role: Role) -> String {
    match Phase::of(order) {
        Phase::AwaitingSeller => "Awaiting seller confirmation".to_string(),
        Phase::Confirmed => "Confirmed".to_string(),
        Phase::AwaitingMutual {
            buyer_done,
            seller_done,
        } => {
            if buyer_done && seller_done {
                return "Both parties confirmed, settling".to_string();
            }
            if !buyer_done && !seller_done {
                return "Waiting for both parties".to_string();
            }
            let (done, pending) = if buyer_done {
                (Role::Buyer, Role::Seller)
            } else {
                (Role::Seller, Role::Buyer)
            };
            match role {
                Role::Observer => format!("{} confirmed, waiting for {}", done.title(), pending),
                r if r == done => format!("Waiting for {}", pending),
                _ => format!("{} confirmed", done.title()),
            }
        }
        Phase::Completed => "Completed".to_string(),
        Phase::Cancelled => "Cancelled".to_string(),
    }
}

/// Longer explanation shown under the status on the detail view.
pub fn describe_progress(order: &Order) -> &'static str {
    match Phase::of(order) {
        Phase::AwaitingSeller => {
            "Waiting for the seller to confirm. The seller may accept or reject the order."
        }
        Phase::Confirmed => {
            "The seller confirmed. Both buyer and seller now need to mark the trade complete."
        }
        Phase::AwaitingMutual {
            buyer_done: true,
            seller_done: true,
        } => "Both parties confirmed. Waiting for the system to settle.",
        Phase::AwaitingMutual {
            buyer_done: true, ..
        } => "The buyer confirmed. The trade completes once the seller confirms too.",
        Phase::AwaitingMutual {
            seller_done: true, ..
        } => "The seller confirmed. The trade completes once the buyer confirms too.",
        Phase::AwaitingMutual { .. } => {
            "Waiting for both parties. The trade completes once both have confirmed."
        }
        Phase::Completed => "Both parties confirmed. The trade is complete and can be rated.",
        Phase::Cancelled => "The order was cancelled.",
    }
}

/// One step of the detail view's progress timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineStep {
    pub title: &'static str,
    pub completed: bool,
    pub time: Option<NaiveDateTime>,
}

/// Builds the detail view's timeline.
///
/// An order cancelled before either party marked completion shows every step
/// after "placed" as not reached.
pub fn timeline(order: &Order) -> Vec<TimelineStep> {
    let status = order.order_status;
    let cancelled_early =
        status == OrderStatus::Cancelled && !order.if_buyer_confirm && !order.if_seller_confirm;
    let reached = |cond: bool| !cancelled_early && cond;

    let mut steps = vec![
        TimelineStep {
            title: "Order placed",
            completed: true,
            time: order.create_time,
        },
        TimelineStep {
            title: "Seller confirmed",
            completed: reached(status > OrderStatus::PendingSellerConfirmation),
            time: order.confirm_time,
        },
        TimelineStep {
            title: "Buyer marked complete",
            completed: reached(order.if_buyer_confirm),
            time: order.finish_time.filter(|_| order.if_buyer_confirm),
        },
        TimelineStep {
            title: "Seller marked complete",
            completed: reached(order.if_seller_confirm),
            time: order.finish_time.filter(|_| order.if_seller_confirm),
        },
        TimelineStep {
            title: "Trade completed",
            completed: reached(status == OrderStatus::Completed),
            time: order.finish_time.filter(|_| status == OrderStatus::Completed),
        },
    ];
    if status == OrderStatus::Cancelled {
        steps.push(TimelineStep {
            title: "Order cancelled",
            completed: true,
            time: order.cancel_time,
        });
    }
    steps
}

/// What the server acknowledged, ready to be folded into the local order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    Cancelled { reason: Option<String> },
    MarkedComplete,
    Rated(Rating),
}

impl Outcome {
    pub fn action(&self) -> Action {
        match self {
            Outcome::Confirmed => Action::Confirm,
            Outcome::Cancelled { .. } => Action::Cancel,
            Outcome::MarkedComplete => Action::MarkComplete,
            Outcome::Rated(_) => Action::Rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot {action} as {role} while the order is {status}")]
    IllegalAction {
        action: Action,
        role: Role,
        status: OrderStatus,
    },
}

/// Checks that `role` may perform `action` on `order` as it stands.
pub fn ensure_legal(order: &Order, role: Role, action: Action) -> Result<(), LifecycleError> {
    if legal_actions(order, role).contains(action) {
        Ok(())
    } else {
        Err(LifecycleError::IllegalAction {
            action,
            role,
            status: order.order_status,
        })
    }
}

/// Folds an acknowledged `outcome` by `role` into `order`.
///
/// Illegal combinations leave the order untouched. Completion converges: the
/// second party's mark lands the order on `Completed` whichever side went
/// first.
pub fn apply(
    order: &mut Order,
    role: Role,
    outcome: Outcome,
    now: NaiveDateTime,
) -> Result<(), LifecycleError> {
    ensure_legal(order, role, outcome.action())?;

    match outcome {
        Outcome::Confirmed => {
            order.order_status = OrderStatus::Confirmed;
            order.confirm_time = Some(now);
        }
        Outcome::Cancelled { reason } => {
            order.order_status = OrderStatus::Cancelled;
            order.cancel_time = Some(now);
            order.cancel_reason = reason;
        }
        Outcome::MarkedComplete => {
            let other_done = match role {
                Role::Buyer => {
                    order.if_buyer_confirm = true;
                    order.if_seller_confirm
                }
                // `ensure_legal` never lets an observer through
                _ => {
                    order.if_seller_confirm = true;
                    order.if_buyer_confirm
                }
            };
            order.finish_time = Some(now);
            order.order_status = if other_done {
                OrderStatus::Completed
            } else {
                OrderStatus::AwaitingMutualCompletion
            };
        }
        Outcome::Rated(rating) => {
            let credit = Some(Credit { rating });
            match role {
                Role::Buyer => order.seller_credit = credit,
                _ => order.buyer_credit = credit,
            }
        }
    }
    Ok(())
}

/// `Completed` holds exactly when both completion flags are set, and no flag
/// is set before the seller confirmed.
///
/// Status 2 with both flags is tolerated as the transient sub-case.
pub fn is_consistent(order: &Order) -> bool {
    let (b, s) = (order.if_buyer_confirm, order.if_seller_confirm);
    match order.order_status {
        OrderStatus::PendingSellerConfirmation | OrderStatus::Confirmed => !b && !s,
        OrderStatus::AwaitingMutualCompletion => true,
        OrderStatus::Completed => b && s,
        OrderStatus::Cancelled => !(b && s),
    }
}
