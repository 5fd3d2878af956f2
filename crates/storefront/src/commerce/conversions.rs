//! Conversions from platform orders to cart types.

use pineapple_checkout_core::{CartItem, CartSnapshot, LineId};
use tracing::warn;

use super::{RemoteOrder, RemoteOrderLine};

/// Derive the cart snapshot for an order.
///
/// Line totals are recomputed from unit price and quantity; a line the
/// platform reports with an impossible quantity or price is dropped.
#[must_use]
pub fn snapshot_from_order(order: &RemoteOrder) -> CartSnapshot {
    CartSnapshot::from_items(order.lines.iter().filter_map(convert_line))
}

fn convert_line(line: &RemoteOrderLine) -> Option<CartItem> {
    let variant = &line.product_variant;
    let product_name = variant
        .product
        .as_ref()
        .map_or_else(|| variant.name.clone(), |p| p.name.clone());

    match CartItem::new(
        LineId::Confirmed(line.id.clone()),
        variant.id.clone(),
        line.quantity,
        line.unit_price_with_tax,
    ) {
        Ok(item) => Some(
            item.with_names(product_name, variant.name.clone())
                .with_image(line.featured_asset.as_ref().map(|a| a.preview.clone())),
        ),
        Err(e) => {
            warn!(line_id = %line.id, error = %e, "Skipping unusable order line");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use pineapple_checkout_core::{
        Money, OrderCode, OrderId, OrderLineId, OrderState, VariantId,
    };

    use super::*;
    use crate::commerce::{Asset, ProductRef, RemoteVariant};

    fn line(id: &str, variant: &str, quantity: u32, price: i64) -> RemoteOrderLine {
        RemoteOrderLine {
            id: OrderLineId::new(id),
            quantity,
            unit_price_with_tax: Money::from_minor(price),
            line_price_with_tax: Money::from_minor(price).times(quantity),
            featured_asset: Some(Asset {
                preview: format!("https://cdn.example.com/{variant}.jpg"),
            }),
            product_variant: RemoteVariant {
                id: VariantId::new(variant),
                name: "Large".to_string(),
                product: Some(ProductRef {
                    name: "Pineapple Pouch".to_string(),
                }),
            },
        }
    }

    fn order(lines: Vec<RemoteOrderLine>) -> RemoteOrder {
        RemoteOrder {
            id: OrderId::new("1"),
            code: OrderCode::new("NP-0001"),
            state: OrderState::AddingItems,
            currency_code: Some("USD".to_string()),
            total_quantity: 0,
            sub_total_with_tax: Money::ZERO,
            shipping_with_tax: Money::ZERO,
            total_with_tax: Money::ZERO,
            customer: None,
            shipping_address: None,
            lines,
            payments: vec![],
        }
    }

    #[test]
    fn test_snapshot_from_order() {
        let snapshot =
            snapshot_from_order(&order(vec![line("L1", "V1", 2, 1799), line("L2", "V2", 1, 500)]));

        assert_eq!(snapshot.items().len(), 2);
        assert_eq!(snapshot.total(), Money::from_minor(4098));
        assert_eq!(snapshot.quantity(), 3);
        let first = &snapshot.items()[0];
        assert_eq!(first.id(), &LineId::Confirmed(OrderLineId::new("L1")));
        assert_eq!(first.name(), "Pineapple Pouch");
        assert_eq!(first.variant_name(), "Large");
        assert_eq!(first.image_ref(), Some("https://cdn.example.com/V1.jpg"));
        assert!(!snapshot.has_tentative_lines());
    }

    #[test]
    fn test_zero_quantity_line_is_dropped() {
        let snapshot = snapshot_from_order(&order(vec![line("L1", "V1", 0, 1799)]));
        assert!(snapshot.is_empty());
        assert!(snapshot.totals_consistent());
    }
}
