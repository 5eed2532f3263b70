use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use tracing::{debug, error};
use uuid::Uuid;

use crate::entities::item;
use crate::errors::ServiceError;

/// Physical stock ledger. These two functions are the only mutation
/// points on `quantity_in_storage`; callers invoke them exactly once per
/// pickup/return transition, inside the same transaction as the line
/// status change.

/// Decrements on-hand stock at pickup. Fails if the ledger would go
/// negative.
pub async fn reserve_physical<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    quantity: i32,
) -> Result<item::Model, ServiceError> {
    let item = load_item(conn, item_id).await?;

    let remaining = item.quantity_in_storage - quantity;
    if remaining < 0 {
        return Err(ServiceError::InsufficientPhysicalStock(format!(
            "item {} has {} in storage, cannot hand out {}",
            item_id, item.quantity_in_storage, quantity
        )));
    }

    debug!(
        item_id = %item_id,
        from = item.quantity_in_storage,
        to = remaining,
        "reserving physical stock"
    );

    let mut active: item::ActiveModel = item.into();
    active.quantity_in_storage = Set(remaining);
    Ok(active.update(conn).await?)
}

/// Increments on-hand stock at return. An over-release past
/// `total_quantity` is a programmer error, not a clamp.
pub async fn release_physical<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    quantity: i32,
) -> Result<item::Model, ServiceError> {
    let item = load_item(conn, item_id).await?;

    let restored = item.quantity_in_storage + quantity;
    if restored > item.total_quantity {
        error!(
            item_id = %item_id,
            in_storage = item.quantity_in_storage,
            total = item.total_quantity,
            quantity,
            "release would exceed total quantity"
        );
        return Err(ServiceError::InvariantViolation(format!(
            "releasing {} units of item {} would exceed its total of {}",
            quantity, item_id, item.total_quantity
        )));
    }

    debug!(
        item_id = %item_id,
        from = item.quantity_in_storage,
        to = restored,
        "releasing physical stock"
    );

    let mut active: item::ActiveModel = item.into();
    active.quantity_in_storage = Set(restored);
    Ok(active.update(conn).await?)
}

async fn load_item<C: ConnectionTrait>(conn: &C, item_id: Uuid) -> Result<item::Model, ServiceError> {
    item::Entity::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}
