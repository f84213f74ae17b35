use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payment_confirmations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_payment_id: String,
    pub user_id: Option<Uuid>,
    pub confirmed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
