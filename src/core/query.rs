use crate::core::menu_store::MenuStore;
use crate::core::{MenuDate, MenuEntry};
use std::sync::Arc;

/// 對菜單資料的唯讀查詢。資料量只有數週，線性掃描即可。
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<MenuStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<MenuStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MenuStore {
        &self.store
    }

    /// `None` 代表當天沒有菜單資料 (與分類為空的菜單不同)
    pub fn lookup_by_date(&self, date: MenuDate) -> Option<&MenuEntry> {
        self.store.get(&date)
    }

    /// 任一菜名包含關鍵字 (不分大小寫) 的日子，依日期遞增
    pub fn search(&self, keyword: &str) -> Vec<&MenuEntry> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.store
            .entries()
            .filter(|entry| entry_contains(entry, &needle))
            .collect()
    }

    /// 以空白分隔的多個關鍵字，每個都要出現在當天某道菜中
    pub fn search_all_terms(&self, query: &str) -> Vec<&MenuEntry> {
        let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() {
            return Vec::new();
        }
        self.store
            .entries()
            .filter(|entry| terms.iter().all(|term| entry_contains(entry, term)))
            .collect()
    }

    pub fn list_all(&self) -> Vec<&MenuEntry> {
        self.store.entries().collect()
    }

    pub fn available_dates(&self) -> Vec<MenuDate> {
        self.store.dates().copied().collect()
    }
}

fn entry_contains(entry: &MenuEntry, needle: &str) -> bool {
    entry
        .all_dishes()
        .any(|(_, dish)| dish.to_lowercase().contains(needle))
}
