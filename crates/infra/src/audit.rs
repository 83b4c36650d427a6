//! Physical count audit against the inventory read side.
//!
//! Counting staff submit raw (product, location, counted) lines; the audit
//! resolves each line against the stock read model and produces the inputs a
//! reconciliation report needs: the total expected quantity and one
//! discrepancy input per line whose count disagrees with the books.

use stockpilot_core::{DomainError, ProductId, WarehouseId};

use crate::projections::inventory_stock::{InventoryStockProjection, StockReadModel};
use crate::read_model::ScopedStore;
use stockpilot_inventory::InventoryRecordId;

/// One raw line from a physical count sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountLine {
    pub product_id: ProductId,
    pub location: String,
    pub counted_quantity: i64,
}

/// A counted line that disagrees with the book quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscrepancyInput {
    pub product_id: ProductId,
    pub location: String,
    pub expected_quantity: i64,
    pub counted_quantity: i64,
    pub unit_cost: f64,
}

/// Outcome of auditing a full count sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CountAudit {
    pub total_expected_quantity: i64,
    pub lines_counted: usize,
    pub discrepancies: Vec<DiscrepancyInput>,
}

/// Audit a count sheet against the stock read model.
///
/// Every line must reference a product tracked in the warehouse. Expected
/// quantities come from the book stock at audit time, so the caller should
/// hold product locks for the duration of the count-to-report window.
pub fn audit_count<S>(
    projection: &InventoryStockProjection<S>,
    warehouse_id: WarehouseId,
    lines: &[CountLine],
) -> Result<CountAudit, DomainError>
where
    S: ScopedStore<InventoryRecordId, StockReadModel>,
{
    if lines.is_empty() {
        return Err(DomainError::validation("count sheet has no lines"));
    }

    let mut total_expected_quantity = 0;
    let mut discrepancies = Vec::new();
    for line in lines {
        if line.counted_quantity < 0 {
            return Err(DomainError::validation(format!(
                "counted quantity for product {} cannot be negative",
                line.product_id
            )));
        }
        let record_id = projection
            .record_for_product(warehouse_id, line.product_id)
            .ok_or(DomainError::NotFound)?;
        let record = projection
            .get(warehouse_id, &record_id)
            .ok_or(DomainError::NotFound)?;

        total_expected_quantity += record.current_stock;
        if record.current_stock != line.counted_quantity {
            discrepancies.push(DiscrepancyInput {
                product_id: line.product_id,
                location: line.location.clone(),
                expected_quantity: record.current_stock,
                counted_quantity: line.counted_quantity,
                unit_cost: record.unit_cost,
            });
        }
    }

    Ok(CountAudit {
        total_expected_quantity,
        lines_counted: lines.len(),
        discrepancies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryScopedStore;
    use stockpilot_core::AggregateId;
    use stockpilot_inventory::StockStatus;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(uuid::Uuid::from_u128(1))
    }

    fn projection_with(
        records: Vec<StockReadModel>,
    ) -> InventoryStockProjection<InMemoryScopedStore<InventoryRecordId, StockReadModel>> {
        let projection = InventoryStockProjection::new(InMemoryScopedStore::new());
        for record in records {
            projection.seed_for_tests(test_warehouse_id(), record);
        }
        projection
    }

    fn record(product: u128, stock: i64, cost: f64) -> StockReadModel {
        StockReadModel {
            record_id: InventoryRecordId::new(AggregateId::new()),
            product_id: ProductId::from_uuid(uuid::Uuid::from_u128(product)),
            location: "A-01".to_string(),
            current_stock: stock,
            reserved_stock: 0,
            minimum_stock_level: 5,
            maximum_stock_level: 500,
            reorder_point: 10,
            unit_cost: cost,
            status: StockStatus::Optimal,
            open_alerts: Vec::new(),
        }
    }

    #[test]
    fn clean_count_produces_no_discrepancies() {
        let projection = projection_with(vec![record(10, 40, 2.5)]);
        let audit = audit_count(
            &projection,
            test_warehouse_id(),
            &[CountLine {
                product_id: ProductId::from_uuid(uuid::Uuid::from_u128(10)),
                location: "A-01".to_string(),
                counted_quantity: 40,
            }],
        )
        .unwrap();

        assert_eq!(audit.total_expected_quantity, 40);
        assert_eq!(audit.lines_counted, 1);
        assert!(audit.discrepancies.is_empty());
    }

    #[test]
    fn variance_surfaces_book_figures() {
        let projection = projection_with(vec![record(10, 40, 2.5), record(11, 12, 30.0)]);
        let audit = audit_count(
            &projection,
            test_warehouse_id(),
            &[
                CountLine {
                    product_id: ProductId::from_uuid(uuid::Uuid::from_u128(10)),
                    location: "A-01".to_string(),
                    counted_quantity: 38,
                },
                CountLine {
                    product_id: ProductId::from_uuid(uuid::Uuid::from_u128(11)),
                    location: "A-01".to_string(),
                    counted_quantity: 12,
                },
            ],
        )
        .unwrap();

        assert_eq!(audit.total_expected_quantity, 52);
        assert_eq!(audit.discrepancies.len(), 1);
        let input = &audit.discrepancies[0];
        assert_eq!(input.expected_quantity, 40);
        assert_eq!(input.counted_quantity, 38);
        assert_eq!(input.unit_cost, 2.5);
    }

    #[test]
    fn unknown_product_is_rejected() {
        let projection = projection_with(vec![]);
        let err = audit_count(
            &projection,
            test_warehouse_id(),
            &[CountLine {
                product_id: ProductId::from_uuid(uuid::Uuid::from_u128(99)),
                location: "A-01".to_string(),
                counted_quantity: 3,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn negative_count_is_rejected() {
        let projection = projection_with(vec![record(10, 40, 2.5)]);
        let err = audit_count(
            &projection,
            test_warehouse_id(),
            &[CountLine {
                product_id: ProductId::from_uuid(uuid::Uuid::from_u128(10)),
                location: "A-01".to_string(),
                counted_quantity: -1,
            }],
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("negative") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
