use crate::core::{DateRange, MenuDate};
use crate::utils::error::{LunchError, Result};
use chrono::{Datelike, TimeDelta, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// 「今週の月曜」這類表達在該日已過時的處理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThisWeekPolicy {
    /// 解析為本週內的那一天，即使已經過去
    #[default]
    WithinWeek,
    /// 已過去時改為下一次出現的那一天
    UpcomingOnly,
}

/// 資料驅動的日期規則表。新增說法只需要改表，不需要改流程。
#[derive(Debug, Clone)]
pub struct DateRules {
    pub relative_terms: Vec<(String, i64)>,
    pub weekday_names: Vec<(String, Weekday)>,
    pub next_markers: Vec<String>,
    pub this_week_markers: Vec<String>,
    pub next_week_markers: Vec<String>,
    pub this_month_terms: Vec<String>,
    pub next_month_terms: Vec<String>,
    pub last_month_terms: Vec<String>,
    pub month_names: Vec<(String, u32)>,
    pub future_terms: Vec<String>,
    /// 星期表達中可以忽略的助詞與符號
    pub filler_tokens: Vec<String>,
    pub this_week_policy: ThisWeekPolicy,
    pub week_start: Weekday,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DateRules {
    fn default() -> Self {
        let relative: &[(&str, i64)] = &[
            ("今日", 0),
            ("きょう", 0),
            ("本日", 0),
            ("today", 0),
            ("明日", 1),
            ("あした", 1),
            ("あす", 1),
            ("tomorrow", 1),
            ("明後日", 2),
            ("あさって", 2),
            ("day after tomorrow", 2),
            ("昨日", -1),
            ("きのう", -1),
            ("yesterday", -1),
            ("一昨日", -2),
            ("おととい", -2),
        ];
        let weekdays: &[(&str, Weekday)] = &[
            ("月曜", Weekday::Mon),
            ("火曜", Weekday::Tue),
            ("水曜", Weekday::Wed),
            ("木曜", Weekday::Thu),
            ("金曜", Weekday::Fri),
            ("土曜", Weekday::Sat),
            ("日曜", Weekday::Sun),
            ("monday", Weekday::Mon),
            ("tuesday", Weekday::Tue),
            ("wednesday", Weekday::Wed),
            ("thursday", Weekday::Thu),
            ("friday", Weekday::Fri),
            ("saturday", Weekday::Sat),
            ("sunday", Weekday::Sun),
        ];
        let months = [
            "january", "february", "march", "april", "may", "june", "july", "august", "september",
            "october", "november", "december",
        ];

        Self {
            relative_terms: relative.iter().map(|(t, o)| (t.to_string(), *o)).collect(),
            weekday_names: weekdays.iter().map(|(t, w)| (t.to_string(), *w)).collect(),
            next_markers: owned(&["次の", "今度の", "next"]),
            this_week_markers: owned(&["今週", "this week", "this"]),
            next_week_markers: owned(&["来週", "らいしゅう", "next week"]),
            this_month_terms: owned(&["今月", "こんげつ", "this month"]),
            next_month_terms: owned(&["来月", "らいげつ", "next month"]),
            last_month_terms: owned(&["先月", "せんげつ", "last month"]),
            month_names: months
                .iter()
                .enumerate()
                .map(|(i, m)| (m.to_string(), i as u32 + 1))
                .collect(),
            future_terms: owned(&["今後", "これから", "全部", "すべて", "all", "all future", "upcoming", "future"]),
            filler_tokens: owned(&["曜日", "日", "の", "は", "か", "と", "、", ",", "on", "or", "and", "(", ")", " "]),
            this_week_policy: ThisWeekPolicy::default(),
            week_start: Weekday::Mon,
        }
    }
}

struct Patterns {
    absolute: Regex,
    absolute_ja: Regex,
    month_day: Regex,
    month_day_ja: Regex,
    year_month: Regex,
    month_ja: Regex,
    month_name: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        absolute: Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})$").unwrap(),
        absolute_ja: Regex::new(r"^(\d{4})年(\d{1,2})月(\d{1,2})日$").unwrap(),
        month_day: Regex::new(r"^(\d{1,2})[-/](\d{1,2})$").unwrap(),
        month_day_ja: Regex::new(r"^(\d{1,2})月(\d{1,2})日?$").unwrap(),
        year_month: Regex::new(r"^(\d{4})(?:年|-|/)(\d{1,2})月?$").unwrap(),
        month_ja: Regex::new(r"^(\d{1,2})月$").unwrap(),
        month_name: Regex::new(r"^(?:in )?([a-z]+)(?: (\d{4}))?$").unwrap(),
    })
}

/// 將自然語言的日期表達轉為日曆日期。純函式，只依賴 (表達, 基準日)。
#[derive(Debug, Clone, Default)]
pub struct DateResolver {
    rules: DateRules,
}

impl DateResolver {
    pub fn new(rules: DateRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &DateRules {
        &self.rules
    }

    /// 單一日期。月份表達在這裡不合法。
    pub fn resolve(&self, expression: &str, reference_date: MenuDate) -> Result<MenuDate> {
        let norm = normalize(expression);
        let unparseable = || LunchError::UnparseableDate {
            expression: expression.to_string(),
        };

        if norm.is_empty() {
            return Err(unparseable());
        }

        if let Some(date) = self.match_absolute(&norm, reference_date) {
            return date.ok_or_else(unparseable);
        }

        if let Some((_, offset)) = self.rules.relative_terms.iter().find(|(term, _)| *term == norm) {
            return add_days(reference_date, *offset).ok_or_else(unparseable);
        }

        if let Some(date) = self.match_weekday(&norm, expression, reference_date)? {
            return Ok(date);
        }

        if self.match_month(&norm, reference_date).is_some() {
            tracing::debug!("Month-only expression '{}' is only valid as a range", expression);
        }

        Err(unparseable())
    }

    /// 日期範圍：單日、整個月或「今後全部」
    pub fn resolve_range(&self, expression: &str, reference_date: MenuDate) -> Result<DateRange> {
        let norm = normalize(expression);

        if self.rules.future_terms.iter().any(|t| *t == norm) {
            return Ok(DateRange::AllFuture {
                from: reference_date,
            });
        }

        match self.match_month(&norm, reference_date) {
            Some(Some((year, month))) => return Ok(DateRange::Month { year, month }),
            Some(None) => {
                return Err(LunchError::UnparseableDate {
                    expression: expression.to_string(),
                })
            }
            None => {}
        }

        self.resolve(expression, reference_date).map(DateRange::Day)
    }

    /// 外層 Option：是否符合格式；內層 Option：日期是否有效
    fn match_absolute(&self, norm: &str, reference_date: MenuDate) -> Option<Option<MenuDate>> {
        let p = patterns();
        for re in [&p.absolute, &p.absolute_ja] {
            if let Some(caps) = re.captures(norm) {
                let year = caps[1].parse().ok();
                let month = caps[2].parse().ok();
                let day = caps[3].parse().ok();
                return Some(match (year, month, day) {
                    (Some(y), Some(m), Some(d)) => MenuDate::from_ymd_opt(y, m, d),
                    _ => None,
                });
            }
        }
        for re in [&p.month_day, &p.month_day_ja] {
            if let Some(caps) = re.captures(norm) {
                let month = caps[1].parse().ok();
                let day = caps[2].parse().ok();
                return Some(match (month, day) {
                    (Some(m), Some(d)) => MenuDate::from_ymd_opt(reference_date.year(), m, d),
                    _ => None,
                });
            }
        }
        None
    }

    fn match_weekday(&self, norm: &str, expression: &str, reference_date: MenuDate) -> Result<Option<MenuDate>> {
        let mut found: Vec<Weekday> = Vec::new();
        for (name, weekday) in &self.rules.weekday_names {
            if norm.contains(name.as_str()) && !found.contains(weekday) {
                found.push(*weekday);
            }
        }

        if found.is_empty() {
            return Ok(None);
        }

        let mut rest = norm.to_string();
        for (name, _) in &self.rules.weekday_names {
            rest = rest.replace(name.as_str(), " ");
        }
        let next_week = strip_markers(&mut rest, &self.rules.next_week_markers);
        let this_week = strip_markers(&mut rest, &self.rules.this_week_markers);
        let next = strip_markers(&mut rest, &self.rules.next_markers);
        for filler in &self.rules.filler_tokens {
            rest = rest.replace(filler.as_str(), "");
        }
        if !rest.is_empty() {
            // 星期之外還有其他字，不是單純的日期表達
            return Ok(None);
        }

        let weekday = match found.as_slice() {
            [single] => *single,
            _ => {
                return Err(LunchError::AmbiguousDate {
                    expression: expression.to_string(),
                    reason: "more than one weekday named".to_string(),
                })
            }
        };

        if next_week && this_week {
            return Err(LunchError::AmbiguousDate {
                expression: expression.to_string(),
                reason: "both this week and next week given".to_string(),
            });
        }

        let ahead = days_until(reference_date.weekday(), weekday);
        let week_start = self.start_of_week(reference_date);
        let in_week = days_until(self.rules.week_start, weekday);

        let date = if next_week {
            add_days(week_start, 7 + in_week)
        } else if this_week {
            let candidate = add_days(week_start, in_week);
            match self.rules.this_week_policy {
                ThisWeekPolicy::WithinWeek => candidate,
                ThisWeekPolicy::UpcomingOnly => candidate.and_then(|c| {
                    if c >= reference_date {
                        Some(c)
                    } else {
                        add_days(c, 7)
                    }
                }),
            }
        } else if next {
            add_days(reference_date, if ahead == 0 { 7 } else { ahead })
        } else {
            add_days(reference_date, ahead)
        };

        date.map(Some).ok_or_else(|| LunchError::UnparseableDate {
            expression: expression.to_string(),
        })
    }

    /// 外層 Option：是否為月份表達；內層 Option：月份是否有效
    fn match_month(&self, norm: &str, reference_date: MenuDate) -> Option<Option<(i32, u32)>> {
        let current = (reference_date.year(), reference_date.month());
        if self.rules.this_month_terms.iter().any(|t| t == norm) {
            return Some(Some(current));
        }
        if self.rules.next_month_terms.iter().any(|t| t == norm) {
            return Some(Some(shift_month(current, 1)));
        }
        if self.rules.last_month_terms.iter().any(|t| t == norm) {
            return Some(Some(shift_month(current, -1)));
        }

        let p = patterns();
        let valid = |year: i32, month: Option<u32>| month.filter(|m| (1..=12).contains(m)).map(|m| (year, m));

        if let Some(caps) = p.year_month.captures(norm) {
            let year = caps[1].parse().unwrap_or(current.0);
            return Some(valid(year, caps[2].parse().ok()));
        }
        if let Some(caps) = p.month_ja.captures(norm) {
            return Some(valid(current.0, caps[1].parse().ok()));
        }
        if let Some(caps) = p.month_name.captures(norm) {
            let name = &caps[1];
            if let Some((_, month)) = self.rules.month_names.iter().find(|(n, _)| n == name) {
                let year = caps
                    .get(2)
                    .and_then(|y| y.as_str().parse().ok())
                    .unwrap_or(current.0);
                return Some(Some((year, *month)));
            }
        }
        None
    }

    fn start_of_week(&self, date: MenuDate) -> MenuDate {
        date - TimeDelta::days(days_until(self.rules.week_start, date.weekday()))
    }
}

/// 超出日曆範圍時為 None
fn add_days(date: MenuDate, days: i64) -> Option<MenuDate> {
    date.checked_add_signed(TimeDelta::try_days(days)?)
}

/// 從 `from` 往後數到 `to` 的天數 (0..=6)
fn days_until(from: Weekday, to: Weekday) -> i64 {
    (to.num_days_from_monday() as i64 - from.num_days_from_monday() as i64).rem_euclid(7)
}

fn shift_month((year, month): (i32, u32), delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn strip_markers(text: &mut String, markers: &[String]) -> bool {
    let mut hit = false;
    for marker in markers {
        if text.contains(marker.as_str()) {
            *text = text.replace(marker.as_str(), " ");
            hit = true;
        }
    }
    hit
}

/// 全形數字與符號轉半形、轉小寫、合併空白
fn normalize(expression: &str) -> String {
    let converted: String = expression
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '／' => '/',
            '－' => '-',
            '（' => '(',
            '）' => ')',
            '　' => ' ',
            other => other,
        })
        .collect();
    converted
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
