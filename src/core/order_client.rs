use crate::config::OrderSettings;
use crate::core::remote_page::{extract_notice, RemotePage, TOKEN_FIELD};
use crate::core::{
    Credentials, DateRange, MenuCategory, MenuDate, OrderGateway, OrderRequest, OrderResult, OrderStatus,
    OrderSummary,
};
use crate::utils::error::{LunchError, Result};
use crate::utils::validation;
use async_trait::async_trait;
use chrono::Datelike;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ORIGIN, REFERER};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

const AUTH_COOKIE: &str = ".ASPXAUTH";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";
const BODY_SNIPPET_CHARS: usize = 500;
/// 暫時性錯誤最多重試一次
pub const MAX_RETRY_ATTEMPTS: u32 = 1;

/// 暫時性錯誤 (5xx / 逾時 / 連線失敗) 的重試策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    generation: u64,
}

#[derive(Debug)]
struct RemoteResponse {
    status: StatusCode,
    body: String,
}

/// 單日表單的內容
#[derive(Debug)]
struct DayForm {
    token: String,
    quantities: BTreeMap<MenuCategory, u32>,
}

enum Applied {
    NothingToCancel,
    Confirmed { notice: Option<String> },
    Unconfirmed { actual: Option<u32>, notice: Option<String> },
}

/// 訂餐網站的 HTTP 客戶端。
///
/// 本身不保存訂單狀態，每次查詢都從遠端重新取得。登入狀態以 cookie 保存並在
/// 同一程序內共用；(重新) 登入由 `session` 鎖序列化，同時失效的呼叫只會登入一次。
pub struct OrderClient {
    http: Client,
    jar: Arc<Jar>,
    base_url: Url,
    credentials: Credentials,
    retry: RetryPolicy,
    session: Mutex<SessionState>,
}

impl OrderClient {
    pub fn new(settings: &OrderSettings, credentials: Credentials) -> Result<Self> {
        let mut base_url = validation::validate_base_url("order.base_url", &settings.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_seconds()))
            .build()
            .map_err(|e| LunchError::ConfigError {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            jar,
            base_url,
            credentials,
            retry: settings.retry_policy(),
            session: Mutex::new(SessionState::default()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
        let OrderRequest {
            date,
            menu_type,
            quantity,
        } = request;
        tracing::info!("🍱 Placing order: {} {} x{}", date, menu_type.display_name(), quantity);

        let applied = self.apply(date, menu_type, quantity).await?;
        let (status, detail) = match applied {
            Applied::Confirmed { notice } => (
                OrderStatus::Placed,
                notice.unwrap_or_else(|| {
                    format!("{} の {} を {} 個注文しました。", date, menu_type.display_name(), quantity)
                }),
            ),
            Applied::Unconfirmed { actual, notice } => (OrderStatus::RemoteError, unconfirmed_detail(actual, notice)),
            // 數量為正時不會發生
            Applied::NothingToCancel => (OrderStatus::NotFound, String::new()),
        };

        Ok(OrderResult {
            status,
            reference: None,
            detail,
            date,
            menu_type,
            quantity,
        })
    }

    pub async fn cancel_order(&self, date: MenuDate, menu_type: MenuCategory) -> Result<OrderResult> {
        tracing::info!("🗑️ Cancelling order: {} {}", date, menu_type.display_name());

        let (status, detail) = match self.apply(date, menu_type, 0).await? {
            Applied::NothingToCancel => (
                OrderStatus::NotFound,
                format!("{} の {} の注文はありません。", date, menu_type.display_name()),
            ),
            Applied::Confirmed { notice } => (
                OrderStatus::Cancelled,
                notice.unwrap_or_else(|| format!("{} の {} の注文を取り消しました。", date, menu_type.display_name())),
            ),
            Applied::Unconfirmed { actual, notice } => (OrderStatus::RemoteError, unconfirmed_detail(actual, notice)),
        };

        Ok(OrderResult {
            status,
            reference: None,
            detail,
            date,
            menu_type,
            quantity: 0,
        })
    }

    pub async fn get_order_status(&self, range: DateRange) -> Result<Vec<OrderSummary>> {
        tracing::info!("📋 Fetching order status for {}", range);

        let mut summaries = match range {
            DateRange::Day(date) => {
                let (form, _) = self.day_form(&self.day_url(date)?).await?;
                vec![OrderSummary {
                    date,
                    orders: form.quantities,
                }]
            }
            DateRange::Month { year, month } => self.month_summaries(year, month).await?,
            DateRange::AllFuture { from } => {
                let (next_year, next_month) = if from.month() == 12 {
                    (from.year() + 1, 1)
                } else {
                    (from.year(), from.month() + 1)
                };
                let mut all = self.month_summaries(from.year(), from.month()).await?;
                all.extend(self.month_summaries(next_year, next_month).await?);
                all.retain(|s| s.date >= from);
                all
            }
        };

        for summary in &mut summaries {
            summary.orders.retain(|_, q| *q > 0);
        }
        summaries.retain(|s| s.has_orders());
        summaries.sort_by_key(|s| s.date);
        Ok(summaries)
    }

    /// 把某分類的數量設為 `target`，其他分類維持遠端目前的值，再以遠端回應確認。
    async fn apply(&self, date: MenuDate, category: MenuCategory, target: u32) -> Result<Applied> {
        let url = self.day_url(date)?;
        let mut relogged = false;

        loop {
            let (form, generation) = self.day_form(&url).await?;
            let current = form.quantities.get(&category).copied().unwrap_or(0);
            if target == 0 && current == 0 {
                return Ok(Applied::NothingToCancel);
            }

            let mut quantities = form.quantities.clone();
            quantities.insert(category, target);
            let response = self.submit(&url, form.token, &quantities).await?;

            let page = RemotePage::classify(&response.body);
            if let RemotePage::Login { .. } = page {
                if relogged {
                    return Err(LunchError::auth("session rejected while submitting the order"));
                }
                tracing::info!("🔑 Session expired during submit, logging in again");
                self.refresh_session(generation).await?;
                relogged = true;
                continue;
            }

            let notice = extract_notice(&response.body);
            let actual = match confirmed_quantity(&page, category) {
                Some(actual) => Some(actual),
                None => {
                    // 回應頁面看不出結果，重新讀取表單確認
                    tracing::debug!("Submit answered with {}, re-reading the order form", page.kind());
                    self.day_form(&url).await?.0.quantities.get(&category).copied()
                }
            };

            return Ok(if actual == Some(target) {
                tracing::info!("✅ Remote confirmed {} {} = {}", date, category.display_name(), target);
                Applied::Confirmed { notice }
            } else {
                tracing::warn!(
                    "⚠️ Remote did not confirm {} {} = {} (remote shows {:?})",
                    date,
                    category.display_name(),
                    target,
                    actual
                );
                Applied::Unconfirmed { actual, notice }
            });
        }
    }

    async fn submit(&self, url: &Url, token: String, quantities: &BTreeMap<MenuCategory, u32>) -> Result<RemoteResponse> {
        let mut form = vec![(TOKEN_FIELD.to_string(), token)];
        for category in MenuCategory::ALL {
            form.push((
                format!("[{}].数量", category.remote_index()),
                quantities.get(&category).copied().unwrap_or(0).to_string(),
            ));
        }

        let origin = self.origin();
        self.send("order submit", || {
            self.http
                .post(url.clone())
                .header(REFERER, url.as_str())
                .header(ORIGIN, origin.as_str())
                .form(&form)
        })
        .await
    }

    /// 表單與讀取它時的 session 世代
    async fn day_form(&self, url: &Url) -> Result<(DayForm, u64)> {
        let (page, response, generation) = self.fetch_page("order form", url).await?;
        match page {
            RemotePage::OrderForm { token, quantities, .. } => Ok((DayForm { token, quantities }, generation)),
            other => Err(unexpected_page("order form", &other, &response)),
        }
    }

    async fn month_summaries(&self, year: i32, month: u32) -> Result<Vec<OrderSummary>> {
        let mut url = self.endpoint("Order")?;
        url.query_pairs_mut().append_pair("idx", &month.to_string());

        let (page, response, _) = self.fetch_page("monthly orders", &url).await?;
        let rows = match page {
            RemotePage::MonthTable { rows } => rows,
            other => return Err(unexpected_page("monthly order table", &other, &response)),
        };

        let mut summaries = Vec::new();
        for row in rows {
            if row.holiday.is_some() {
                continue;
            }
            match MenuDate::from_ymd_opt(year, month, row.day) {
                Some(date) => summaries.push(OrderSummary {
                    date,
                    orders: row.orders,
                }),
                None => tracing::warn!("⚠️ Skipping invalid day {} in {}-{:02}", row.day, year, month),
            }
        }
        Ok(summaries)
    }

    /// 需要登入的 GET。拿到登入頁代表 session 過期，重新登入後再試一次。
    /// 回傳取得頁面時所用的 session 世代。
    async fn fetch_page(&self, what: &str, url: &Url) -> Result<(RemotePage, RemoteResponse, u64)> {
        let generation = self.ensure_session().await?;
        let response = self.get(what, url).await?;
        let page = RemotePage::classify(&response.body);
        if !matches!(page, RemotePage::Login { .. }) {
            return Ok((page, response, generation));
        }

        tracing::info!("🔑 Session expired, logging in again");
        let generation = self.refresh_session(generation).await?;
        let response = self.get(what, url).await?;
        match RemotePage::classify(&response.body) {
            RemotePage::Login { .. } => Err(LunchError::auth("session rejected right after login")),
            page => Ok((page, response, generation)),
        }
    }

    async fn get(&self, what: &str, url: &Url) -> Result<RemoteResponse> {
        self.send(what, || {
            self.http
                .get(url.clone())
                .header(REFERER, self.base_url.as_str())
        })
        .await
    }

    async fn ensure_session(&self) -> Result<u64> {
        let mut session = self.session.lock().await;
        if !session.authenticated {
            self.login().await?;
            session.authenticated = true;
            session.generation += 1;
        }
        Ok(session.generation)
    }

    /// `stale_generation` 是呼叫端看到失效時的 session 世代。
    /// 若其他呼叫已經換過 session，直接沿用。
    async fn refresh_session(&self, stale_generation: u64) -> Result<u64> {
        let mut session = self.session.lock().await;
        if session.authenticated && session.generation != stale_generation {
            return Ok(session.generation);
        }
        session.authenticated = false;
        self.login().await?;
        session.authenticated = true;
        session.generation += 1;
        Ok(session.generation)
    }

    async fn login(&self) -> Result<()> {
        tracing::info!("🔐 Logging in to {}", self.base_url);
        self.jar
            .add_cookie_str(&format!("{}=; Max-Age=0; Path=/", AUTH_COOKIE), &self.base_url);

        let login_url = self.base_url.clone();
        let response = self.get("login page", &login_url).await?;
        let token = match RemotePage::classify(&response.body) {
            RemotePage::Login { token: Some(token) } => token,
            other => return Err(unexpected_page("login form", &other, &response)),
        };

        let form = [
            (TOKEN_FIELD, token.as_str()),
            ("CompanyCD", self.credentials.company_cd.as_str()),
            ("UserCD", self.credentials.user_cd.as_str()),
            ("Password", self.credentials.password.as_str()),
        ];
        let origin = self.origin();
        let response = self
            .send("login", || {
                self.http
                    .post(login_url.clone())
                    .header(REFERER, login_url.as_str())
                    .header(ORIGIN, origin.as_str())
                    .form(&form)
            })
            .await?;

        let rejected = matches!(RemotePage::classify(&response.body), RemotePage::Login { .. });
        if rejected || !self.has_auth_cookie() {
            tracing::error!("❌ Login rejected by the ordering system");
            return Err(LunchError::auth("the ordering system rejected the credentials"));
        }

        tracing::info!("✅ Logged in");
        Ok(())
    }

    fn has_auth_cookie(&self) -> bool {
        let prefix = format!("{}=", AUTH_COOKIE);
        self.jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().map(|s| s.to_string()).ok())
            .map(|cookies| {
                cookies
                    .split(';')
                    .map(str::trim)
                    .any(|c| c.starts_with(&prefix) && c.len() > prefix.len())
            })
            .unwrap_or(false)
    }

    /// 暫時性失敗時依 `retry` 重試；認證錯誤與其他錯誤直接回傳。
    async fn send<F>(&self, what: &str, build: F) -> Result<RemoteResponse>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match self.send_once(what, build()).await {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!("🔁 {} failed ({}), retrying in {:?}", what, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("❌ {} failed: {}", what, e);
                    return Err(e);
                }
                Ok(response) => return Ok(response),
            }
        }
    }

    async fn send_once(&self, what: &str, request: RequestBuilder) -> Result<RemoteResponse> {
        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timed out"
            } else if e.is_connect() {
                "connection failed"
            } else {
                "request failed"
            };
            LunchError::remote(e.status().map(|s| s.as_u16()), format!("{} {}: {}", what, kind, e), "")
        })?;

        let status = response.status();
        tracing::debug!("📡 {} -> {} ({})", what, status, response.url());
        let body = response.text().await.map_err(|e| {
            LunchError::remote(Some(status.as_u16()), format!("failed to read {} response: {}", what, e), "")
        })?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LunchError::auth(format!("{} answered HTTP {}", what, status.as_u16())));
        }
        if !status.is_success() {
            return Err(LunchError::remote(
                Some(status.as_u16()),
                format!("{} answered HTTP {}", what, status.as_u16()),
                snippet(&body),
            ));
        }

        Ok(RemoteResponse { status, body })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| LunchError::ConfigError {
            message: format!("Invalid endpoint '{}': {}", path, e),
        })
    }

    fn day_url(&self, date: MenuDate) -> Result<Url> {
        let mut url = self.endpoint("Order/CreateDetails")?;
        url.query_pairs_mut()
            .append_pair("dt", &date.format("%Y/%m/%d").to_string())
            .append_pair("kbn", "1")
            .append_pair("err", "false");
        Ok(url)
    }

    fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }
}

#[async_trait]
impl OrderGateway for OrderClient {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
        OrderClient::place_order(self, request).await
    }

    async fn cancel_order(&self, date: MenuDate, menu_type: MenuCategory) -> Result<OrderResult> {
        OrderClient::cancel_order(self, date, menu_type).await
    }

    async fn get_order_status(&self, range: DateRange) -> Result<Vec<OrderSummary>> {
        OrderClient::get_order_status(self, range).await
    }
}

/// 從送出後的回應頁面讀出該分類目前的數量。
/// 只有單日表單算數：月一覧不帶年月，無法確定是哪一天的列。
fn confirmed_quantity(page: &RemotePage, category: MenuCategory) -> Option<u32> {
    match page {
        RemotePage::OrderForm { quantities, .. } => Some(quantities.get(&category).copied().unwrap_or(0)),
        _ => None,
    }
}

fn unconfirmed_detail(actual: Option<u32>, notice: Option<String>) -> String {
    let mut detail = match actual {
        Some(q) => format!("注文システムで変更を確認できませんでした (現在の数量: {})。", q),
        None => "注文システムで変更を確認できませんでした。".to_string(),
    };
    if let Some(notice) = notice {
        detail.push(' ');
        detail.push_str(&notice);
    }
    detail
}

fn unexpected_page(expected: &str, page: &RemotePage, response: &RemoteResponse) -> LunchError {
    LunchError::remote(
        Some(response.status.as_u16()),
        format!("expected {}, got {}", expected, page.kind()),
        snippet(&response.body),
    )
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}
