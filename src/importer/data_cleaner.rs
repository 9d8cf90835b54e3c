// ==========================================
// 案件管理系统数据迁移 - 数据清洗器实现
// ==========================================
// 职责: TRIM / NULL 标准化 / 布尔词表 / 数值清洗 / 多格式日期
// 约束: 只做值级转换，失败返回可读消息（由映射器转为行级问题）
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// 未配置日期格式时按顺序尝试
pub const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%d.%m.%Y"];

/// 带时间部分的日期（仅取日期）
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

const TRUE_WORDS: &[&str] = &["true", "t", "yes", "y", "1", "x", "是", "active"];
const FALSE_WORDS: &[&str] = &["false", "f", "no", "n", "0", "否", "inactive"];

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '￥'];

pub struct DataCleaner;

impl DataCleaner {
    /// 空白串视为缺失
    pub fn normalize_null<'a>(&self, value: &'a str) -> Option<&'a str> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    pub fn parse_bool(&self, value: &str) -> Result<bool, String> {
        let lower = value.trim().to_lowercase();
        if TRUE_WORDS.contains(&lower.as_str()) {
            Ok(true)
        } else if FALSE_WORDS.contains(&lower.as_str()) {
            Ok(false)
        } else {
            Err(format!("无法解析为布尔值: {}", value))
        }
    }

    /// 去除千分位、货币符号、空白；会计负数 (12.50) → -12.50
    fn clean_number(&self, value: &str) -> String {
        let trimmed = value.trim();
        let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, trimmed),
        };
        let cleaned: String = body
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',' && !CURRENCY_SYMBOLS.contains(c))
            .collect();
        if negative {
            format!("-{}", cleaned)
        } else {
            cleaned
        }
    }

    pub fn parse_decimal(&self, value: &str) -> Result<f64, String> {
        let cleaned = self.clean_number(value);
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("无法解析为数值: {}", value))
    }

    /// 整数（允许 "12.0" 这类无小数部分的写法）
    pub fn parse_integer(&self, value: &str) -> Result<i64, String> {
        let cleaned = self.clean_number(value);
        if let Ok(v) = cleaned.parse::<i64>() {
            return Ok(v);
        }
        match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
            _ => Err(format!("无法解析为整数: {}", value)),
        }
    }

    /// 日期: 先试配置格式，再试默认格式、带时间格式、Excel 序列日
    pub fn parse_date(&self, value: &str, formats: &[String]) -> Result<NaiveDate, String> {
        let trimmed = value.trim();

        let configured = formats.iter().map(String::as_str);
        let defaults = DEFAULT_DATE_FORMATS.iter().copied();
        for format in configured.chain(defaults) {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Ok(date);
            }
        }

        for format in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(dt.date());
            }
        }

        if let Some(date) = self.excel_serial_date(trimmed) {
            return Ok(date);
        }

        Err(format!("无法解析为日期: {}", value))
    }

    /// Excel 序列日（1900 日期系统，基准 1899-12-30）
    fn excel_serial_date(&self, value: &str) -> Option<NaiveDate> {
        let serial = value.parse::<f64>().ok()?;
        if !(10_000.0..=2_958_465.0).contains(&serial) || value.len() > 10 {
            return None;
        }
        let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        base.checked_add_signed(Duration::days(serial.trunc() as i64))
    }

    /// 枚举规范化: 精确匹配 → 忽略大小写匹配
    ///
    /// # 返回
    /// - Some((标准值, 是否调整了大小写))
    /// - None: 不在允许值内
    pub fn normalize_enum(&self, value: &str, allowed: &[&'static str]) -> Option<(String, bool)> {
        let trimmed = value.trim();
        if let Some(exact) = allowed.iter().find(|a| **a == trimmed) {
            return Some((exact.to_string(), false));
        }
        allowed
            .iter()
            .find(|a| a.eq_ignore_ascii_case(trimmed))
            .map(|a| (a.to_string(), true))
    }
}
