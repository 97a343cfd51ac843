//! 訂餐網站回應頁面的解析。
//!
//! 網站沒有 API，只有 HTML 表單。每個回應都先分類成 [`RemotePage`]，
//! 呼叫端只依分類後的結構取值，不符合預期形狀的頁面一律視為 `Unexpected`。

use crate::core::MenuCategory;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

pub const TOKEN_FIELD: &str = "__RequestVerificationToken";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemotePage {
    /// 登入表單。出現在預期以外的位置時代表 session 已失效。
    Login { token: Option<String> },
    /// 單日訂購表單：目前各分類的數量
    OrderForm {
        token: String,
        quantities: BTreeMap<MenuCategory, u32>,
        notice: Option<String>,
    },
    /// 月訂單一覽
    MonthTable { rows: Vec<MonthRow> },
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRow {
    pub day: u32,
    pub holiday: Option<String>,
    pub orders: BTreeMap<MenuCategory, u32>,
}

struct Patterns {
    input_tag: Regex,
    attribute: Regex,
    quantity_field: Regex,
    table_row: Regex,
    table_cell: Regex,
    any_tag: Regex,
    day_cell: Regex,
    order_item: Regex,
    notice: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        input_tag: Regex::new(r"(?is)<input\b[^>]*>").unwrap(),
        attribute: Regex::new(r#"(?i)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap(),
        quantity_field: Regex::new(r"^(?:\[(\d+)\]\.|_(\d+)__)変更前数量$").unwrap(),
        table_row: Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap(),
        table_cell: Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap(),
        any_tag: Regex::new(r"(?s)<[^>]+>").unwrap(),
        day_cell: Regex::new(r"^(\d{1,2})\s*[(（].[)）]").unwrap(),
        order_item: Regex::new(r"(\w*?(?:らんち|ランチ|その他))\s*(\d+)\s*個").unwrap(),
        notice: Regex::new(
            r#"(?is)<div\b[^>]*class\s*=\s*"[^"]*(?:alert|validation-summary|message)[^"]*"[^>]*>(.*?)</div>"#,
        )
        .unwrap(),
    })
}

impl RemotePage {
    pub fn classify(html: &str) -> Self {
        let inputs = input_tags(html);
        let token = inputs
            .iter()
            .find(|i| i.get("name").map(String::as_str) == Some(TOKEN_FIELD))
            .and_then(|i| i.get("value").cloned());

        let is_login = inputs.iter().any(|i| {
            matches!(i.get("name").map(String::as_str), Some("UserCD") | Some("CompanyCD"))
        });
        if is_login {
            return RemotePage::Login { token };
        }

        let mut quantities = BTreeMap::new();
        for input in &inputs {
            let index = ["id", "name"]
                .iter()
                .filter_map(|k| input.get(*k))
                .find_map(|v| quantity_index(v));
            if let Some(index) = index {
                let Some(category) = MenuCategory::from_remote_index(index) else {
                    tracing::warn!("⚠️ Ignoring unknown order field index {}", index);
                    continue;
                };
                let Some(value) = input.get("value").and_then(|v| v.trim().parse::<u32>().ok()) else {
                    return RemotePage::Unexpected;
                };
                quantities.insert(category, value);
            }
        }
        if !quantities.is_empty() {
            return match token {
                Some(token) => RemotePage::OrderForm {
                    token,
                    quantities,
                    notice: extract_notice(html),
                },
                None => RemotePage::Unexpected,
            };
        }

        // 沒有任何訂單列的月份也是一張 (空的) 表
        let rows = month_rows(html);
        if !rows.is_empty() || (inputs.is_empty() && html.to_lowercase().contains("<table")) {
            return RemotePage::MonthTable { rows };
        }

        RemotePage::Unexpected
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RemotePage::Login { .. } => "login page",
            RemotePage::OrderForm { .. } => "order form",
            RemotePage::MonthTable { .. } => "monthly order table",
            RemotePage::Unexpected => "unexpected page",
        }
    }
}

fn input_tags(html: &str) -> Vec<HashMap<String, String>> {
    let p = patterns();
    p.input_tag
        .find_iter(html)
        .map(|tag| {
            p.attribute
                .captures_iter(tag.as_str())
                .map(|caps| {
                    let name = caps[1].to_lowercase();
                    let value = caps
                        .get(2)
                        .or_else(|| caps.get(3))
                        .map(|m| decode_entities(m.as_str()))
                        .unwrap_or_default();
                    (name, value)
                })
                .collect()
        })
        .collect()
}

fn quantity_index(value: &str) -> Option<usize> {
    let caps = patterns().quantity_field.captures(value)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn month_rows(html: &str) -> Vec<MonthRow> {
    let p = patterns();
    let mut rows = Vec::new();
    for row in p.table_row.captures_iter(html) {
        let cells: Vec<String> = p
            .table_cell
            .captures_iter(&row[1])
            .map(|c| text_content(&c[1]))
            .collect();
        if cells.len() < 2 {
            continue;
        }
        let Some(day) = p
            .day_cell
            .captures(&cells[0])
            .and_then(|c| c[1].parse::<u32>().ok())
        else {
            continue;
        };

        let text = &cells[1];
        if text.contains("休業日") {
            rows.push(MonthRow {
                day,
                holiday: Some(text.clone()),
                orders: BTreeMap::new(),
            });
            continue;
        }

        let mut orders = BTreeMap::new();
        for item in p.order_item.captures_iter(text) {
            let name = &item[1];
            let quantity: u32 = item[2].parse().unwrap_or(0);
            match category_from_remote_name(name) {
                Some(category) if quantity > 0 => {
                    *orders.entry(category).or_insert(0) += quantity;
                }
                Some(_) => {}
                None => tracing::warn!("⚠️ Unknown menu name in order table: {}", name),
            }
        }
        rows.push(MonthRow {
            day,
            holiday: None,
            orders,
        });
    }
    rows
}

/// 網站上的名稱 (和風らんち / あいランチ / その他) 對應到分類
fn category_from_remote_name(name: &str) -> Option<MenuCategory> {
    if name.contains("和風") {
        Some(MenuCategory::Wafu)
    } else if name.contains("あい") {
        Some(MenuCategory::AiLunch)
    } else if name.contains("その他") {
        Some(MenuCategory::Other)
    } else {
        None
    }
}

pub fn extract_notice(html: &str) -> Option<String> {
    patterns()
        .notice
        .captures_iter(html)
        .map(|c| text_content(&c[1]))
        .find(|t| !t.is_empty())
}

fn text_content(fragment: &str) -> String {
    let stripped = patterns().any_tag.replace_all(fragment, "");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
