use crate::core::{MenuCategory, MenuDate, MenuEntry};
use crate::utils::error::{LunchError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// 程序執行期間不可變的菜單資料，以日期為鍵。
#[derive(Debug, Clone, Default)]
pub struct MenuStore {
    entries: BTreeMap<MenuDate, MenuEntry>,
}

/// 一個分類的菜色：陣列，或 OCR 產生的「、」/「,」分隔字串
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DishList {
    List(Vec<String>),
    Joined(String),
}

impl DishList {
    fn into_dishes(self) -> Vec<String> {
        let raw = match self {
            DishList::List(items) => items,
            DishList::Joined(text) => text
                .split([',', '、', '，'])
                .map(|s| s.to_string())
                .collect(),
        };
        raw.into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect()
    }
}

/// 舊版 OCR 輸出的一筆記錄
#[derive(Debug, Deserialize)]
struct MenuRecord {
    date: String,
    #[serde(flatten)]
    categories: BTreeMap<String, DishList>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MenuDocument {
    ByDate(BTreeMap<String, BTreeMap<String, DishList>>),
    Records(Vec<MenuRecord>),
}

impl MenuStore {
    pub fn new(entries: impl IntoIterator<Item = MenuEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.date, e)).collect(),
        }
    }

    /// 從 JSON 檔案載入。任何格式問題都是致命的設定錯誤。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LunchError::ConfigError {
            message: format!("Failed to read menu file '{}': {}", path.display(), e),
        })?;
        let store = Self::from_json_str(&content)?;
        tracing::info!("📋 Loaded {} menu days from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: MenuDocument = serde_json::from_str(content).map_err(|e| LunchError::ConfigError {
            message: format!("Malformed menu document: {}", e),
        })?;

        let rows: Vec<(String, BTreeMap<String, DishList>)> = match document {
            MenuDocument::ByDate(map) => map.into_iter().collect(),
            MenuDocument::Records(records) => records
                .into_iter()
                .map(|r| (r.date, r.categories))
                .collect(),
        };

        let mut entries = BTreeMap::new();
        for (raw_date, raw_categories) in rows {
            let date = parse_menu_date(&raw_date)?;
            let mut entry = MenuEntry::new(date);
            for (label, dishes) in raw_categories {
                let category = MenuCategory::parse(&label).map_err(|_| LunchError::ConfigError {
                    message: format!("Unknown menu category '{}' on {}", label, raw_date),
                })?;
                entry.categories.insert(category, dishes.into_dishes());
            }
            if entries.insert(date, entry).is_some() {
                tracing::warn!("⚠️ Duplicate menu date {}, keeping the later one", date);
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, date: &MenuDate) -> Option<&MenuEntry> {
        self.entries.get(date)
    }

    /// 依日期遞增
    pub fn entries(&self) -> impl Iterator<Item = &MenuEntry> {
        self.entries.values()
    }

    pub fn dates(&self) -> impl Iterator<Item = &MenuDate> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_menu_date(raw: &str) -> Result<MenuDate> {
    let trimmed = raw.trim();
    MenuDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| MenuDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .map_err(|e| LunchError::ConfigError {
            message: format!("Invalid menu date '{}': {}", raw, e),
        })
}
