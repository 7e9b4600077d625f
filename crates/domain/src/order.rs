//! Orders, order lines and the write model produced by checkout.

use chrono::{DateTime, Utc};
use common::{AttemptId, OrderId, OrderItemId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;
use crate::value_objects::{ProductId, Quantity, VariantId};

/// Lifecycle status of an order.
///
/// Checkout only ever creates `Pending` orders; later transitions belong to
/// fulfilment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownOrderStatus(other.to_string())),
        }
    }
}

/// A cart line with the unit price captured during checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl PricedLine {
    /// Returns `unit_price × quantity`.
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Everything needed to write an order; produced by checkout, consumed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub coupon_code: Option<String>,
    pub total: Money,
    pub currency: String,
    pub payment_reference: Option<String>,
}

/// A persisted order line.
///
/// `unit_price` is the price-at-purchase and is never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub coupon_code: Option<String>,
    pub total: Money,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materialises a pending order from the checkout write model.
    pub fn place(new_order: NewOrder, placed_at: DateTime<Utc>) -> Self {
        let id = OrderId::new();
        let items = new_order
            .lines
            .into_iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        Self {
            id,
            attempt_id: new_order.attempt_id,
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            items,
            subtotal: new_order.subtotal,
            discount: new_order.discount,
            coupon_code: new_order.coupon_code,
            total: new_order.total,
            currency: new_order.currency,
            payment_reference: new_order.payment_reference,
            created_at: placed_at,
            updated_at: placed_at,
        }
    }

    /// Returns `Σ(unit_price × quantity)` over the order lines.
    pub fn lines_total(&self) -> Result<Money, DomainError> {
        self.items
            .iter()
            .map(OrderItem::line_total)
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
    }

    /// Returns true if the stored totals agree with the lines and discount.
    pub fn totals_are_consistent(&self) -> bool {
        let Ok(lines_total) = self.lines_total() else {
            return false;
        };
        lines_total == self.subtotal
            && self
                .subtotal
                .checked_sub(self.discount)
                .is_ok_and(|net| net == self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(sku: &str, qty: u32, cents: i64) -> PricedLine {
        PricedLine {
            product_id: sku.into(),
            variant_id: None,
            quantity: Quantity::new(qty).unwrap(),
            unit_price: Money::from_cents(cents),
        }
    }

    fn new_order(lines: Vec<PricedLine>, discount: i64) -> NewOrder {
        let subtotal =
            Money::checked_sum(lines.iter().map(|l| l.line_total().unwrap())).unwrap();
        NewOrder {
            attempt_id: AttemptId::new(),
            user_id: UserId::new(),
            lines,
            subtotal,
            discount: Money::from_cents(discount),
            coupon_code: None,
            total: subtotal.checked_sub(Money::from_cents(discount)).unwrap(),
            currency: "USD".to_string(),
            payment_reference: None,
        }
    }

    #[test]
    fn test_place_creates_pending_order_with_snapshot_prices() {
        let draft = new_order(vec![line("SKU-001", 2, 1000), line("SKU-002", 1, 2500)], 0);
        let attempt_id = draft.attempt_id;
        let order = Order::place(draft, Utc::now());

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.attempt_id, attempt_id);
        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().all(|item| item.order_id == order.id));
        assert_eq!(order.items[0].unit_price.cents(), 1000);
        assert_eq!(order.total.cents(), 4500);
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn test_totals_are_consistent_with_discount() {
        let order = Order::place(new_order(vec![line("SKU-001", 3, 999)], 300), Utc::now());
        assert_eq!(order.lines_total().unwrap().cents(), 2997);
        assert_eq!(order.total.cents(), 2697);
        assert!(order.totals_are_consistent());
    }

    #[test]
    fn test_totals_inconsistent_when_tampered() {
        let mut order = Order::place(new_order(vec![line("SKU-001", 1, 500)], 0), Utc::now());
        order.total = Money::from_cents(499);
        assert!(!order.totals_are_consistent());
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }
}
