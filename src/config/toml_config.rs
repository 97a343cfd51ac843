use crate::core::date_resolver::{DateRules, ThisWeekPolicy};
use crate::core::order_client::{RetryPolicy, MAX_RETRY_ATTEMPTS};
use crate::domain::model::Credentials;
use crate::utils::error::{LunchError, Result};
use crate::utils::validation::{self, Validate};
use chrono::Weekday;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://sumiyoshi.azurewebsites.net";
pub const DEFAULT_MENU_FILE: &str = "menu_data.json";
/// 未設定 BENTO_COMPANY_CD 時使用的公司代碼
pub const DEFAULT_COMPANY_CD: &str = "000748";
/// 追加相對日期說法允許的最大位移 (天)
pub const MAX_RELATIVE_OFFSET_DAYS: i64 = 366;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub menu: MenuSettings,
    #[serde(default)]
    pub order: OrderSettings,
    #[serde(default)]
    pub dates: DateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuSettings {
    pub path: String,
}

impl Default for MenuSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_MENU_FILE.to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OrderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub company_cd: Option<String>,
    pub user_cd: Option<String>,
    pub password: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            company_cd: None,
            user_cd: None,
            password: None,
            timeout_seconds: None,
            retry_attempts: None,
            retry_delay_ms: None,
        }
    }
}

// 密碼不能出現在日誌裡
impl fmt::Debug for OrderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSettings")
            .field("base_url", &self.base_url)
            .field("company_cd", &self.company_cd)
            .field("user_cd", &self.user_cd)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl OrderSettings {
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(30)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_retries: self
                .retry_attempts
                .unwrap_or(default.max_retries)
                .min(MAX_RETRY_ATTEMPTS),
            base_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
        }
    }

    /// 訂餐必須的登入資訊，缺少任何一項都是設定錯誤
    pub fn credentials(&self) -> Result<Credentials> {
        let company_cd = validation::require_text("order.company_cd", &self.company_cd)?;
        let user_cd = validation::require_text("order.user_cd", &self.user_cd)?;
        // 錯誤訊息不能帶出密碼原值
        let password = self.password.as_deref().ok_or_else(|| LunchError::MissingConfigError {
            field: "order.password".to_string(),
        })?;
        if password.is_empty() {
            return Err(LunchError::InvalidConfigValueError {
                field: "order.password".to_string(),
                value: "***".to_string(),
                reason: "Password cannot be empty".to_string(),
            });
        }

        Ok(Credentials {
            company_cd: company_cd.to_string(),
            user_cd: user_cd.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateSettings {
    pub this_week_policy: Option<ThisWeekPolicy>,
    pub week_start: Option<String>,
    /// 追加的相對日期說法，例如 `"しあさって" = 3`
    pub extra_relative_terms: Option<BTreeMap<String, i64>>,
}

impl DateSettings {
    pub fn date_rules(&self) -> Result<DateRules> {
        let mut rules = DateRules::default();
        if let Some(policy) = self.this_week_policy {
            rules.this_week_policy = policy;
        }
        if let Some(week_start) = &self.week_start {
            rules.week_start = week_start
                .parse::<Weekday>()
                .map_err(|_| LunchError::InvalidConfigValueError {
                    field: "dates.week_start".to_string(),
                    value: week_start.clone(),
                    reason: "Expected a weekday name such as 'mon' or 'sunday'".to_string(),
                })?;
        }
        if let Some(extra) = &self.extra_relative_terms {
            for (term, offset) in extra {
                validation::validate_range(
                    &format!("dates.extra_relative_terms.{}", term),
                    *offset,
                    -MAX_RELATIVE_OFFSET_DAYS,
                    MAX_RELATIVE_OFFSET_DAYS,
                )?;
                let term = term.trim().to_lowercase();
                rules.relative_terms.retain(|(t, _)| *t != term);
                rules.relative_terms.push((term, *offset));
            }
        }
        Ok(rules)
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LunchError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| LunchError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 只用環境變數組成配置
    pub fn from_env() -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let parse_env = |name: &str| -> Result<Option<u64>> {
            match env(name) {
                Some(raw) => raw
                    .parse()
                    .map(Some)
                    .map_err(|_| LunchError::InvalidConfigValueError {
                        field: name.to_string(),
                        value: raw,
                        reason: "Expected a non-negative integer".to_string(),
                    }),
                None => Ok(None),
            }
        };

        Ok(Self {
            menu: MenuSettings {
                path: env("LUNCH_MENU_FILE").unwrap_or_else(|| DEFAULT_MENU_FILE.to_string()),
            },
            order: OrderSettings {
                base_url: env("BENTO_BASE_URL").unwrap_or_else(default_base_url),
                company_cd: env("BENTO_COMPANY_CD").or_else(|| Some(DEFAULT_COMPANY_CD.to_string())),
                user_cd: env("BENTO_USER_CD"),
                password: env("BENTO_PASSWORD"),
                timeout_seconds: parse_env("BENTO_TIMEOUT_SECONDS")?,
                retry_attempts: parse_env("BENTO_RETRY_ATTEMPTS")?.map(|v| v.min(u32::MAX as u64) as u32),
                retry_delay_ms: parse_env("BENTO_RETRY_DELAY_MS")?,
            },
            dates: DateSettings::default(),
        })
    }

    /// 替換環境變數 (例如 ${BENTO_PASSWORD})
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        result.to_string()
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_menu_path("menu.path", &self.menu.path)?;
        validation::validate_base_url("order.base_url", &self.order.base_url)?;
        validation::validate_range("order.timeout_seconds", self.order.timeout_seconds(), 1, 300)?;
        if let Some(retries) = self.order.retry_attempts {
            validation::validate_range("order.retry_attempts", retries, 0, MAX_RETRY_ATTEMPTS)?;
        }
        self.dates.date_rules()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[menu]
path = "data/menu_data.json"

[order]
base_url = "https://bento.example.com"
company_cd = "000123"
user_cd = "u42"
password = "pw"
timeout_seconds = 10
retry_attempts = 1
retry_delay_ms = 250

[dates]
this_week_policy = "upcoming_only"
week_start = "sun"

[dates.extra_relative_terms]
"しあさって" = 3
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.menu.path, "data/menu_data.json");
        assert_eq!(config.order.timeout_seconds(), 10);

        let retry = config.order.retry_policy();
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.base_delay, Duration::from_millis(250));

        let rules = config.dates.date_rules().unwrap();
        assert_eq!(rules.this_week_policy, ThisWeekPolicy::UpcomingOnly);
        assert_eq!(rules.week_start, Weekday::Sun);
        assert!(rules.relative_terms.contains(&("しあさって".to_string(), 3)));

        assert_eq!(config.order.credentials().unwrap().user_cd, "u42");
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.menu.path, DEFAULT_MENU_FILE);
        assert_eq!(config.order.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.order.retry_policy().max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("LUNCH_TEST_PASSWORD", "from-env");

        let toml_content = r#"
[order]
company_cd = "000123"
user_cd = "u42"
password = "${LUNCH_TEST_PASSWORD}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.order.credentials().unwrap().password, "from-env");

        std::env::remove_var("LUNCH_TEST_PASSWORD");
    }

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let config = AppConfig::from_toml_str("[order]\nuser_cd = \"u42\"\n").unwrap();
        let err = config.order.credentials().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, LunchError::MissingConfigError { .. }));
    }

    #[test]
    fn test_config_validation() {
        let bad_url = AppConfig::from_toml_str("[order]\nbase_url = \"invalid-url\"\n").unwrap();
        assert!(bad_url.validate().is_err());

        let bad_menu = AppConfig::from_toml_str("[menu]\npath = \"menu.pdf\"\n").unwrap();
        assert!(bad_menu.validate().is_err());

        let bad_week = AppConfig::from_toml_str("[dates]\nweek_start = \"someday\"\n").unwrap();
        assert!(bad_week.validate().is_err());
    }

    #[test]
    fn test_more_than_one_retry_is_rejected() {
        let config = AppConfig::from_toml_str("[order]\nretry_attempts = 2\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(LunchError::InvalidConfigValueError { .. })
        ));
        // 未驗證的設定也不會重試超過一次
        assert_eq!(config.order.retry_policy().max_retries, 1);

        let no_retry = AppConfig::from_toml_str("[order]\nretry_attempts = 0\n").unwrap();
        assert!(no_retry.validate().is_ok());
        assert_eq!(no_retry.order.retry_policy().max_retries, 0);
    }

    #[test]
    fn test_out_of_range_relative_offset_is_rejected() {
        let toml_content = "[dates.extra_relative_terms]\n\"いつか\" = 999999999999\n";
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(LunchError::InvalidConfigValueError { .. })
        ));
        assert!(config.dates.date_rules().is_err());

        let year_ahead = AppConfig::from_toml_str("[dates.extra_relative_terms]\n\"来年の今日\" = 365\n").unwrap();
        assert!(year_ahead.validate().is_ok());
    }

    #[test]
    fn test_env_company_code_defaults() {
        std::env::remove_var("BENTO_COMPANY_CD");
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.order.company_cd.as_deref(), Some(DEFAULT_COMPANY_CD));
    }

    #[test]
    fn test_debug_output_hides_password() {
        let config = AppConfig::from_toml_str("[order]\npassword = \"hunter2\"\n").unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[menu]\npath = \"/srv/lunch/menu_data.json\"\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.menu.path, "/srv/lunch/menu_data.json");
    }
}
