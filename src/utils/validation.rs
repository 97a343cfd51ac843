use crate::utils::error::{LunchError, Result};
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> LunchError {
    LunchError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// 訂餐網站的根網址：只接受 http(s)，不能帶查詢字串
pub fn validate_base_url(field: &str, raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(invalid(field, raw, "URL cannot be empty"));
    }
    let url = Url::parse(raw).map_err(|e| invalid(field, raw, format!("Invalid URL format: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(field, raw, format!("Unsupported URL scheme: {}", url.scheme())));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(field, raw, "Base URL must not carry a query or fragment"));
    }
    Ok(url)
}

/// 菜單檔：非空、沒有 NUL、副檔名為 .json
pub fn validate_menu_path(field: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid(field, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field, path, "Path contains null bytes"));
    }
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(()),
        Some(ext) => Err(invalid(field, path, format!("Menu data must be a .json file, got .{}", ext))),
        None => Err(invalid(field, path, "Menu data must be a .json file")),
    }
}

/// 必填且不能只有空白
pub fn require_text<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
    let value = value.as_deref().ok_or_else(|| LunchError::MissingConfigError {
        field: field.to_string(),
    })?;
    if value.trim().is_empty() {
        return Err(invalid(field, value, "Value cannot be empty or whitespace-only"));
    }
    Ok(value)
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(field: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(field, value, format!("Value must be between {} and {}", min, max)));
    }
    Ok(())
}
