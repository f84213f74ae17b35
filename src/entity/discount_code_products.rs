use sea_orm::entity::prelude::*;

/// Product scope of a discount code. A code without rows here applies to every product.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "discount_code_products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub discount_code_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::discount_codes::Entity",
        from = "Column::DiscountCodeId",
        to = "super::discount_codes::Column::Id"
    )]
    DiscountCodes,
    #[sea_orm(
        belongs_to = "super::products::Entity",
        from = "Column::ProductId",
        to = "super::products::Column::Id"
    )]
    Products,
}

impl Related<super::discount_codes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountCodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
