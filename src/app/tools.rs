use crate::core::date_resolver::DateResolver;
use crate::core::query::QueryEngine;
use crate::core::{MenuCategory, MenuDate, MenuEntry, OrderGateway, OrderRequest, OrderResult, OrderStatus};
use crate::utils::error::LunchError;
use std::sync::Arc;

/// AI 助手呼叫的工具。所有錯誤都在這裡轉成給使用者看的訊息，不往外丟。
pub struct LunchTools<G: OrderGateway> {
    query: QueryEngine,
    resolver: DateResolver,
    orders: Option<Arc<G>>,
    today: Option<MenuDate>,
}

impl<G: OrderGateway> LunchTools<G> {
    pub fn new(query: QueryEngine, resolver: DateResolver, orders: Option<Arc<G>>) -> Self {
        Self {
            query,
            resolver,
            orders,
            today: None,
        }
    }

    /// 固定「今天」，測試用
    pub fn with_today(mut self, today: MenuDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> MenuDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn get_lunch_menu(&self, date_str: &str) -> String {
        let date = match self.resolver.resolve(date_str, self.today()) {
            Ok(date) => date,
            Err(e) => return format!("❌ {}", e.user_friendly_message()),
        };
        self.render_day(date)
    }

    /// 看起來像日期就查那天，否則當成關鍵字搜尋
    pub fn search_menu(&self, query: &str) -> String {
        match self.resolver.resolve(query, self.today()) {
            Ok(date) => return self.render_day(date),
            Err(e @ LunchError::AmbiguousDate { .. }) => return format!("❌ {}", e.user_friendly_message()),
            Err(_) => {}
        }

        if self.query.store().is_empty() {
            return "メニューデータが見つかりません。".to_string();
        }

        let hits = self.query.search_all_terms(query);
        if hits.is_empty() {
            return format!("「{}」に一致するメニューは見つかりませんでした。", query.trim());
        }

        let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        let blocks: Vec<String> = hits
            .iter()
            .map(|entry| {
                let mut lines = vec![format!("📅 {}", entry.date)];
                for (category, dishes) in &entry.categories {
                    let joined = dishes.join(", ");
                    let lowered = joined.to_lowercase();
                    if terms.iter().any(|t| lowered.contains(t.as_str())) {
                        lines.push(format!("  {} {}: {}", category.emoji(), category.display_name(), joined));
                    }
                }
                lines.join("\n")
            })
            .collect();

        format!(
            "「{}」の検索結果 ({} 件):\n\n{}",
            query.trim(),
            hits.len(),
            blocks.join("\n\n")
        )
    }

    pub fn list_all_menus(&self) -> String {
        let entries = self.query.list_all();
        if entries.is_empty() {
            return "メニューデータが見つかりません。".to_string();
        }

        let mut blocks = vec![format!("📋 全メニュー一覧 ({} 日分)", entries.len())];
        blocks.extend(entries.iter().map(|e| render_entry(e, "  ")));
        blocks.join("\n\n")
    }

    pub async fn place_order(&self, date: &str, menu_type: &str, quantity: u32) -> String {
        let Some(orders) = &self.orders else {
            return not_configured();
        };
        let request = self
            .resolver
            .resolve(date, self.today())
            .and_then(|date| Ok((date, MenuCategory::parse(menu_type)?)))
            .and_then(|(date, category)| OrderRequest::new(date, category, quantity));
        let request = match request {
            Ok(request) => request,
            Err(e) => return format!("❌ {}", e.user_friendly_message()),
        };

        match orders.place_order(request).await {
            Ok(result) => render_result(&result),
            Err(e) => format!("❌ 注文に失敗しました: {}", e.user_friendly_message()),
        }
    }

    pub async fn cancel_order(&self, date: &str, menu_type: &str) -> String {
        let Some(orders) = &self.orders else {
            return not_configured();
        };
        let target = self
            .resolver
            .resolve(date, self.today())
            .and_then(|date| Ok((date, MenuCategory::parse(menu_type)?)));
        let (date, category) = match target {
            Ok(target) => target,
            Err(e) => return format!("❌ {}", e.user_friendly_message()),
        };

        match orders.cancel_order(date, category).await {
            Ok(result) => render_result(&result),
            Err(e) => format!("❌ 注文の取り消しに失敗しました: {}", e.user_friendly_message()),
        }
    }

    pub async fn get_order_status(&self, range_str: &str) -> String {
        let Some(orders) = &self.orders else {
            return not_configured();
        };
        let range = match self.resolver.resolve_range(range_str, self.today()) {
            Ok(range) => range,
            Err(e) => return format!("❌ {}", e.user_friendly_message()),
        };

        let summaries = match orders.get_order_status(range).await {
            Ok(summaries) => summaries,
            Err(e) => return format!("❌ 注文状況の取得に失敗しました: {}", e.user_friendly_message()),
        };

        if summaries.is_empty() {
            return format!("📅 {} の注文はありません。", range);
        }

        let mut lines = vec![format!("📋 {} の注文状況", range)];
        for summary in &summaries {
            let orders: Vec<String> = summary
                .orders
                .iter()
                .map(|(category, quantity)| format!("{} {}個", category.display_name(), quantity))
                .collect();
            lines.push(format!("  📅 {}: {}", summary.date, orders.join(", ")));
        }
        lines.join("\n")
    }

    fn render_day(&self, date: MenuDate) -> String {
        if self.query.store().is_empty() {
            return "メニューデータが見つかりません。".to_string();
        }
        match self.query.lookup_by_date(date) {
            Some(entry) => {
                let mut lines = vec![format!("📅 {} のランチメニュー", date)];
                lines.extend(dish_lines(entry, ""));
                lines.join("\n")
            }
            None => {
                let available: Vec<String> = self.query.available_dates().iter().map(|d| d.to_string()).collect();
                format!(
                    "{} のメニューは見つかりませんでした。\n利用可能な日付: {}",
                    date,
                    available.join(", ")
                )
            }
        }
    }
}

fn render_entry(entry: &MenuEntry, indent: &str) -> String {
    let mut lines = vec![format!("📅 {}", entry.date)];
    lines.extend(dish_lines(entry, indent));
    lines.join("\n")
}

fn dish_lines(entry: &MenuEntry, indent: &str) -> Vec<String> {
    if entry.is_empty() {
        return vec![format!("{}(メニュー情報なし)", indent)];
    }
    entry
        .categories
        .iter()
        .filter(|(_, dishes)| !dishes.is_empty())
        .map(|(category, dishes)| {
            format!(
                "{}{} {}: {}",
                indent,
                category.emoji(),
                category.display_name(),
                dishes.join(", ")
            )
        })
        .collect()
}

fn render_result(result: &OrderResult) -> String {
    let icon = match result.status {
        OrderStatus::Placed | OrderStatus::Cancelled => "✅",
        OrderStatus::NotFound => "ℹ️",
        OrderStatus::RemoteError => "❌",
    };
    format!("{} {}", icon, result.detail)
}

fn not_configured() -> String {
    "❌ 注文機能は設定されていません。BENTO_USER_CD と BENTO_PASSWORD を設定してください。".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::menu_store::MenuStore;
    use crate::core::{DateRange, OrderSummary};
    use crate::utils::error::Result;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// 記錄呼叫內容的假訂餐系統
    #[derive(Default)]
    struct MockGateway {
        placed: Mutex<Vec<OrderRequest>>,
        ranges: Mutex<Vec<DateRange>>,
        fail_with_auth: bool,
    }

    #[async_trait]
    impl OrderGateway for MockGateway {
        async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
            if self.fail_with_auth {
                return Err(LunchError::auth("rejected"));
            }
            self.placed.lock().unwrap().push(request.clone());
            Ok(OrderResult {
                status: OrderStatus::Placed,
                reference: None,
                detail: format!("{} を注文しました。", request.date),
                date: request.date,
                menu_type: request.menu_type,
                quantity: request.quantity,
            })
        }

        async fn cancel_order(&self, date: MenuDate, menu_type: MenuCategory) -> Result<OrderResult> {
            Ok(OrderResult {
                status: OrderStatus::NotFound,
                reference: None,
                detail: format!("{} の注文はありません。", date),
                date,
                menu_type,
                quantity: 0,
            })
        }

        async fn get_order_status(&self, range: DateRange) -> Result<Vec<OrderSummary>> {
            self.ranges.lock().unwrap().push(range);
            let mut orders = BTreeMap::new();
            orders.insert(MenuCategory::AiLunch, 2);
            Ok(vec![OrderSummary {
                date: date(2026, 2, 9),
                orders,
            }])
        }
    }

    fn date(y: i32, m: u32, d: u32) -> MenuDate {
        MenuDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tools(gateway: Option<Arc<MockGateway>>) -> LunchTools<MockGateway> {
        let json = r#"{
            "2026-02-09": {
                "あいランチ": ["ハムベーコンフライ", "コールスロー"],
                "和風": ["ブリの漬け焼き"]
            },
            "2026-02-10": { "和風": ["サバの味噌煮"] }
        }"#;
        let store = Arc::new(MenuStore::from_json_str(json).unwrap());
        LunchTools::new(QueryEngine::new(store), DateResolver::default(), gateway).with_today(date(2026, 2, 8))
    }

    #[test]
    fn test_get_lunch_menu_for_tomorrow() {
        let output = tools(None).get_lunch_menu("明日");
        assert!(output.starts_with("📅 2026-02-09 のランチメニュー"));
        assert!(output.contains("🍱 あいランチ: ハムベーコンフライ, コールスロー"));
        assert!(output.contains("🐟 和風ランチ: ブリの漬け焼き"));
    }

    #[test]
    fn test_get_lunch_menu_missing_day_lists_available_dates() {
        let output = tools(None).get_lunch_menu("2026-02-11");
        assert!(output.contains("見つかりませんでした"));
        assert!(output.contains("2026-02-09, 2026-02-10"));
    }

    #[test]
    fn test_unparseable_date_becomes_message() {
        let output = tools(None).get_lunch_menu("いつか");
        assert!(output.starts_with("❌"));
        assert!(output.contains("いつか"));
    }

    #[test]
    fn test_search_menu_by_keyword_and_date() {
        let tools = tools(None);

        let output = tools.search_menu("フライ");
        assert!(output.contains("(1 件)"));
        assert!(output.contains("📅 2026-02-09"));
        assert!(!output.contains("ブリ"));

        assert!(tools.search_menu("寿司").contains("見つかりませんでした"));
        assert!(tools.search_menu("あさって").contains("サバの味噌煮"));

        // 星期混在關鍵字裡時當成關鍵字搜尋，不是日期錯誤
        let mixed = tools.search_menu("月曜と火曜のカレー");
        assert!(mixed.contains("見つかりませんでした"));
        assert!(!mixed.starts_with("❌"));
    }

    #[test]
    fn test_list_all_menus() {
        let output = tools(None).list_all_menus();
        assert!(output.starts_with("📋 全メニュー一覧 (2 日分)"));
        assert!(output.find("2026-02-09").unwrap() < output.find("2026-02-10").unwrap());
    }

    #[test]
    fn test_place_order_resolves_date_and_menu_type() {
        let gateway = Arc::new(MockGateway::default());
        let tools = tools(Some(gateway.clone()));

        let output = tokio_test::block_on(tools.place_order("明日", "あい", 1));
        assert!(output.starts_with("✅"));

        let placed = gateway.placed.lock().unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].date, date(2026, 2, 9));
        assert_eq!(placed[0].menu_type, MenuCategory::AiLunch);
    }

    #[test]
    fn test_place_order_rejects_bad_input_before_remote_call() {
        let gateway = Arc::new(MockGateway::default());
        let tools = tools(Some(gateway.clone()));

        assert!(tokio_test::block_on(tools.place_order("明日", "洋食", 1)).contains("不明なメニュー種別"));
        assert!(tokio_test::block_on(tools.place_order("明日", "和風", 0)).starts_with("❌"));
        assert!(gateway.placed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_order_errors_are_reported_not_propagated() {
        let gateway = Arc::new(MockGateway {
            fail_with_auth: true,
            ..MockGateway::default()
        });
        let output = tokio_test::block_on(tools(Some(gateway)).place_order("明日", "和風", 1));
        assert!(output.starts_with("❌ 注文に失敗しました"));
        assert!(output.contains("ログインに失敗しました"));
    }

    #[test]
    fn test_cancel_without_order_is_informational() {
        let tools = tools(Some(Arc::new(MockGateway::default())));
        let output = tokio_test::block_on(tools.cancel_order("2026-02-09", "その他"));
        assert!(output.starts_with("ℹ️"));
    }

    #[test]
    fn test_order_status_for_month() {
        let gateway = Arc::new(MockGateway::default());
        let tools = tools(Some(gateway.clone()));

        let output = tokio_test::block_on(tools.get_order_status("今月"));
        assert!(output.contains("2026年2月"));
        assert!(output.contains("📅 2026-02-09: あいランチ 2個"));
        assert_eq!(
            gateway.ranges.lock().unwrap()[0],
            DateRange::Month { year: 2026, month: 2 }
        );
    }

    #[test]
    fn test_order_tools_without_gateway() {
        let tools = tools(None);
        assert!(tokio_test::block_on(tools.get_order_status("今月")).contains("設定されていません"));
    }
}
