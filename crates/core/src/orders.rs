//! Orders
//!
//! Orders are created and owned by the backend; the checkout only reads them
//! back for the confirmation step.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{decimal::Amount, uuids::TypedUuid};

/// Order UUID.
pub type OrderUuid = TypedUuid<Order>;

/// Kitchen progress of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting payment.
    Pending,
    /// Paid and accepted.
    Confirmed,
    /// Being made.
    Preparing,
    /// Waiting at the counter.
    Ready,
    /// Collected.
    Completed,
    /// Cancelled before collection.
    Cancelled,
}

impl OrderStatus {
    /// Whether the order can still change.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Product details captured when the order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Menu category.
    #[serde(default)]
    pub category: Option<String>,
}

/// An order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Line identifier.
    pub id: Uuid,
    /// Owning order.
    pub order_id: OrderUuid,
    /// Product identifier.
    pub product_id: String,
    /// Unit price in cents at the time of ordering.
    pub unit_price_cents: i64,
    /// Units ordered.
    pub quantity: u32,
    /// Unit label, e.g. "cup".
    #[serde(default)]
    pub unit_name: Option<String>,
    /// Customer notes for this line.
    #[serde(default)]
    pub notes: Option<String>,
    /// Product snapshot, when the backend includes it.
    #[serde(default)]
    pub product: Option<ProductSnapshot>,
}

impl OrderItem {
    /// Unit price multiplied by quantity.
    pub fn line_total(&self) -> Amount {
        Amount::from_cents(self.unit_price_cents).times(self.quantity)
    }
}

/// An order as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderUuid,
    /// Customer-facing invoice number.
    pub invoice_number: String,
    /// Customer name.
    pub customer_name: String,
    /// Customer phone number.
    pub customer_phone: String,
    /// Customer email address.
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Pickup location.
    pub location_id: Uuid,
    /// Requested pickup time.
    pub pickup_at: Timestamp,
    /// Kitchen progress.
    pub status: OrderStatus,
    /// Subtotal in cents.
    pub subtotal_cents: i64,
    /// GST in cents.
    pub gst_cents: i64,
    /// Total in cents.
    pub total_cents: i64,
    /// Order notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Line items.
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl Order {
    /// Subtotal as an amount.
    pub fn subtotal(&self) -> Amount {
        Amount::from_cents(self.subtotal_cents)
    }

    /// GST as an amount.
    pub fn gst(&self) -> Amount {
        Amount::from_cents(self.gst_cents)
    }

    /// Total as an amount; this is what gets charged.
    pub fn total(&self) -> Amount {
        Amount::from_cents(self.total_cents)
    }

    /// Units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |count, item| count.saturating_add(item.quantity))
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    const ORDER: &str = r#"{
        "id": "01936f3c-0000-7000-8000-000000000001",
        "invoice_number": "MBC-20260101-0001",
        "customer_name": "Tan Ah Kow",
        "customer_phone": "+6591234567",
        "customer_email": null,
        "location_id": "01936f3c-0000-7000-8000-0000000000aa",
        "pickup_at": "2026-01-01T09:30:00Z",
        "status": "confirmed",
        "subtotal_cents": 620,
        "gst_cents": 56,
        "total_cents": 676,
        "items": [
            {
                "id": "01936f3c-0000-7000-8000-0000000000b1",
                "order_id": "01936f3c-0000-7000-8000-000000000001",
                "product_id": "kopi",
                "unit_price_cents": 120,
                "quantity": 1,
                "product": { "id": "kopi", "name": "Kopi" }
            },
            {
                "id": "01936f3c-0000-7000-8000-0000000000b2",
                "order_id": "01936f3c-0000-7000-8000-000000000001",
                "product_id": "toast",
                "unit_price_cents": 250,
                "quantity": 2
            }
        ],
        "created_at": "2026-01-01T09:00:00Z",
        "updated_at": "2026-01-01T09:01:00Z"
    }"#;

    #[test]
    fn decodes_backend_orders() -> TestResult {
        let order: Order = serde_json::from_str(ORDER)?;

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.item_count(), 3);
        assert_eq!(order.total(), "6.76".parse::<Amount>()?);
        assert_eq!(
            order.items.iter().map(OrderItem::line_total).sum::<Amount>(),
            order.subtotal()
        );

        Ok(())
    }

    #[test]
    fn finished_orders_are_closed() {
        assert!(OrderStatus::Ready.is_open());
        assert!(!OrderStatus::Completed.is_open());
        assert!(!OrderStatus::Cancelled.is_open());
    }
}
