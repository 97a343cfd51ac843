use crate::utils::error::{LunchError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 菜單的日期鍵
pub type MenuDate = NaiveDate;

/// 每天提供的三種菜單。順序即訂餐網站表單上的索引 (0/1/2)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MenuCategory {
    #[serde(rename = "和風")]
    Wafu,
    #[serde(rename = "あいランチ")]
    AiLunch,
    #[serde(rename = "その他")]
    Other,
}

impl MenuCategory {
    pub const ALL: [MenuCategory; 3] = [MenuCategory::Wafu, MenuCategory::AiLunch, MenuCategory::Other];

    /// 菜單資料中使用的標籤
    pub fn label(self) -> &'static str {
        match self {
            MenuCategory::Wafu => "和風",
            MenuCategory::AiLunch => "あいランチ",
            MenuCategory::Other => "その他",
        }
    }

    /// 訂餐網站上顯示的名稱
    pub fn display_name(self) -> &'static str {
        match self {
            MenuCategory::Wafu => "和風ランチ",
            MenuCategory::AiLunch => "あいランチ",
            MenuCategory::Other => "その他",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            MenuCategory::Wafu => "🐟",
            MenuCategory::AiLunch => "🍱",
            MenuCategory::Other => "🍙",
        }
    }

    /// 表單欄位 `[i].數量` 的索引
    pub fn remote_index(self) -> usize {
        match self {
            MenuCategory::Wafu => 0,
            MenuCategory::AiLunch => 1,
            MenuCategory::Other => 2,
        }
    }

    pub fn from_remote_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 接受標籤、別名、舊版 OCR 欄位名或 0/1/2
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let lowered = trimmed.to_lowercase();
        let category = match lowered.as_str() {
            "和風" | "和風ランチ" | "和風らんち" | "wafu" | "wafu_lunch" | "0" => Some(MenuCategory::Wafu),
            "あいランチ" | "あい" | "あいらんち" | "ai" | "ai_lunch" | "1" => Some(MenuCategory::AiLunch),
            "その他" | "other" | "2" => Some(MenuCategory::Other),
            _ => None,
        };
        category.ok_or_else(|| LunchError::UnknownMenuType {
            value: trimmed.to_string(),
        })
    }
}

impl fmt::Display for MenuCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for MenuCategory {
    type Err = LunchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// 單日菜單。沒有出現的分類代表當天不提供。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    pub date: MenuDate,
    pub categories: BTreeMap<MenuCategory, Vec<String>>,
}

impl MenuEntry {
    pub fn new(date: MenuDate) -> Self {
        Self {
            date,
            categories: BTreeMap::new(),
        }
    }

    pub fn dishes(&self, category: MenuCategory) -> Option<&[String]> {
        self.categories.get(&category).map(|d| d.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|d| d.is_empty())
    }

    pub fn all_dishes(&self) -> impl Iterator<Item = (MenuCategory, &String)> {
        self.categories
            .iter()
            .flat_map(|(category, dishes)| dishes.iter().map(move |d| (*category, d)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub date: MenuDate,
    pub menu_type: MenuCategory,
    pub quantity: u32,
}

impl OrderRequest {
    pub const MAX_QUANTITY: u32 = 99;

    pub fn new(date: MenuDate, menu_type: MenuCategory, quantity: u32) -> Result<Self> {
        if quantity == 0 || quantity > Self::MAX_QUANTITY {
            return Err(LunchError::ValidationError {
                message: format!(
                    "注文数は 1〜{} の範囲で指定してください (指定値: {})",
                    Self::MAX_QUANTITY,
                    quantity
                ),
            });
        }
        Ok(Self {
            date,
            menu_type,
            quantity,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Placed,
    Cancelled,
    NotFound,
    RemoteError,
}

/// 一次訂餐動作的結果，只回傳給呼叫端，不保存。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub reference: Option<String>,
    pub detail: String,
    pub date: MenuDate,
    pub menu_type: MenuCategory,
    pub quantity: u32,
}

impl OrderResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OrderStatus::Placed | OrderStatus::Cancelled)
    }
}

/// 遠端一天的訂單內容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub date: MenuDate,
    pub orders: BTreeMap<MenuCategory, u32>,
}

impl OrderSummary {
    pub fn has_orders(&self) -> bool {
        self.orders.values().any(|q| *q > 0)
    }
}

/// 訂單查詢的範圍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Day(MenuDate),
    Month { year: i32, month: u32 },
    AllFuture { from: MenuDate },
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::Day(date) => write!(f, "{}", date),
            DateRange::Month { year, month } => write!(f, "{}年{}月", year, month),
            DateRange::AllFuture { from } => write!(f, "{} 以降", from),
        }
    }
}

/// 訂餐網站的登入資訊，整個程序共用且不可變。
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub company_cd: String,
    pub user_cd: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("company_cd", &self.company_cd)
            .field("user_cd", &self.user_cd)
            .field("password", &"***")
            .finish()
    }
}
