use stockpilot_core::WarehouseId;

/// Warehouse context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WarehouseContext {
    warehouse_id: WarehouseId,
}

impl WarehouseContext {
    pub fn new(warehouse_id: WarehouseId) -> Self {
        Self { warehouse_id }
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }
}
