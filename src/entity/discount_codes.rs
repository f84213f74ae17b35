use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    /// Stored uppercase; lookups normalize the same way.
    pub code: String,
    pub kind: DiscountKind,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub value: Decimal,
    pub start_date: Option<DateTimeWithTimeZone>,
    pub end_date: Option<DateTimeWithTimeZone>,
    pub active: bool,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub min_order_amount: Decimal,
    pub max_uses: Option<i32>,
    pub uses: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    serde::Serialize,
    serde::Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    #[sea_orm(string_value = "percent")]
    Percent,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::discount_code_products::Entity")]
    DiscountCodeProducts,
}

impl Related<super::discount_code_products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountCodeProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
