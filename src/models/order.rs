//! Order model and its status transition table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

/// Who is asking for an order transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderActor {
    Buyer,
    Seller,
    Admin,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Statuses reachable from `self`
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Shipped, Cancelled, Refunded],
            Shipped => &[Delivered],
            Delivered => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Leaving for this status puts the ordered quantity back in stock
    pub fn restores_stock(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Whether `actor` may move an order from `self` to `next`.
    ///
    /// The table must allow the move. Buyers pay and cancel, sellers ship,
    /// deliver and refund, admins may do anything the table allows.
    pub fn actor_may_transition(&self, next: OrderStatus, actor: OrderActor) -> bool {
        if !self.can_transition_to(next) {
            return false;
        }
        use OrderStatus::*;
        match actor {
            OrderActor::Admin => true,
            OrderActor::Buyer => matches!((self, next), (Pending, Paid) | (Pending, Cancelled) | (Paid, Cancelled)),
            OrderActor::Seller => matches!(next, Shipped | Delivered | Refunded),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub buyer_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub product_id: i64,
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(Delivered.can_transition_to(Refunded));
        assert!(Cancelled.is_terminal());
        assert!(Refunded.is_terminal());
    }

    #[test]
    fn test_actor_rules() {
        use OrderStatus::*;
        assert!(Pending.actor_may_transition(Paid, OrderActor::Buyer));
        assert!(Paid.actor_may_transition(Cancelled, OrderActor::Buyer));
        assert!(!Paid.actor_may_transition(Shipped, OrderActor::Buyer));
        assert!(Paid.actor_may_transition(Shipped, OrderActor::Seller));
        assert!(!Pending.actor_may_transition(Paid, OrderActor::Seller));
        assert!(!Pending.actor_may_transition(Cancelled, OrderActor::Seller));
        assert!(!Paid.actor_may_transition(Cancelled, OrderActor::Seller));
        assert!(Paid.actor_may_transition(Refunded, OrderActor::Seller));
        assert!(Pending.actor_may_transition(Cancelled, OrderActor::Admin));
        assert!(Delivered.actor_may_transition(Refunded, OrderActor::Admin));
        assert!(!Delivered.actor_may_transition(Shipped, OrderActor::Admin));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn status_strategy() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    fn actor_strategy() -> impl Strategy<Value = OrderActor> {
        prop::sample::select(vec![OrderActor::Buyer, OrderActor::Seller, OrderActor::Admin])
    }

    proptest! {
        /// No actor can perform a move the table forbids, and self-loops never exist.
        #[test]
        fn actor_rules_never_exceed_table(
            from in status_strategy(),
            to in status_strategy(),
            actor in actor_strategy(),
        ) {
            if from.actor_may_transition(to, actor) {
                prop_assert!(from.can_transition_to(to));
            }
            prop_assert!(!from.can_transition_to(from));
        }

        /// Terminal statuses are exactly the ones that restore stock.
        #[test]
        fn terminal_states_restore_stock(status in status_strategy()) {
            prop_assert_eq!(status.is_terminal(), status.restores_stock());
        }
    }
}
