pub mod date_resolver;
pub mod menu_store;
pub mod order_client;
pub mod query;
pub mod remote_page;

pub use crate::domain::model::{
    Credentials, DateRange, MenuCategory, MenuDate, MenuEntry, OrderRequest, OrderResult, OrderStatus,
    OrderSummary,
};
pub use crate::domain::ports::OrderGateway;
pub use crate::utils::error::Result;
