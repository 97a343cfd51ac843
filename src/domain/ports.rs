use crate::domain::model::{DateRange, MenuCategory, MenuDate, OrderRequest, OrderResult, OrderSummary};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 對外部訂餐系統的操作。遠端是訂單狀態唯一的真實來源。
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult>;
    async fn cancel_order(&self, date: MenuDate, menu_type: MenuCategory) -> Result<OrderResult>;
    async fn get_order_status(&self, range: DateRange) -> Result<Vec<OrderSummary>>;
}
