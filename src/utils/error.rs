use thiserror::Error;

#[derive(Error, Debug)]
pub enum LunchError {
    #[error("Unparseable date expression: '{expression}'")]
    UnparseableDate { expression: String },

    #[error("Ambiguous date expression '{expression}': {reason}")]
    AmbiguousDate { expression: String, reason: String },

    #[error("Unknown menu type: '{value}'")]
    UnknownMenuType { value: String },

    #[error("Authentication failed: {message}")]
    AuthError { message: String },

    #[error("Remote ordering system error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    RemoteError {
        status: Option<u16>,
        message: String,
        body: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl LunchError {
    pub fn remote(status: Option<u16>, message: impl Into<String>, body: impl Into<String>) -> Self {
        LunchError::RemoteError {
            status,
            message: message.into(),
            body: body.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        LunchError::AuthError {
            message: message.into(),
        }
    }

    /// 5xx / 逾時 / 連線失敗 這類可以重試一次的錯誤
    pub fn is_transient(&self) -> bool {
        matches!(self, LunchError::RemoteError { status: Some(s), .. } if *s >= 500)
            || matches!(self, LunchError::RemoteError { status: None, .. })
    }

    /// 啟動階段的錯誤，程序應直接結束
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LunchError::ConfigError { .. }
                | LunchError::MissingConfigError { .. }
                | LunchError::InvalidConfigValueError { .. }
        )
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LunchError::UnparseableDate { expression } => format!(
                "「{}」を日付として解釈できませんでした。YYYY-MM-DD、「明日」「来週の月曜」などで指定してください。",
                expression
            ),
            LunchError::AmbiguousDate { expression, .. } => format!(
                "「{}」は複数の日付に解釈できます。日付を一つに絞って指定してください。",
                expression
            ),
            LunchError::UnknownMenuType { value } => format!(
                "不明なメニュー種別: '{}'。使用可能: 和風, あいランチ, その他",
                value
            ),
            LunchError::AuthError { .. } => {
                "ログインに失敗しました。認証情報を確認してください。".to_string()
            }
            LunchError::RemoteError { status, message, .. } => match status {
                Some(s) => format!("注文システムとの通信に失敗しました (HTTP {}): {}", s, message),
                None => format!("注文システムとの通信に失敗しました: {}", message),
            },
            LunchError::ValidationError { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LunchError::remote(Some(503), "unavailable", "").is_transient());
        assert!(LunchError::remote(None, "timeout", "").is_transient());
        assert!(!LunchError::remote(Some(404), "not found", "").is_transient());
        assert!(!LunchError::auth("bad password").is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        let err = LunchError::ConfigError {
            message: "broken menu file".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!LunchError::UnparseableDate {
            expression: "someday".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_remote_error_display_includes_status() {
        let err = LunchError::remote(Some(502), "bad gateway", "<html></html>");
        assert_eq!(
            err.to_string(),
            "Remote ordering system error (HTTP 502): bad gateway"
        );
    }
}
