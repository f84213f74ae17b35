use sea_orm::entity::prelude::*;
use serde_json::Value;

/// Append-only trail of state-changing actions.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    /// Absent for provider webhooks.
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum AuditAction {
    #[sea_orm(string_value = "cart_update")]
    CartUpdate,
    #[sea_orm(string_value = "cart_remove")]
    CartRemove,
    #[sea_orm(string_value = "order_placed")]
    OrderPlaced,
    #[sea_orm(string_value = "payment_captured")]
    PaymentCaptured,
    #[sea_orm(string_value = "discount_created")]
    DiscountCreated,
    #[sea_orm(string_value = "inventory_adjust")]
    InventoryAdjust,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
