//! Cell coercion from raw spreadsheet text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Text,
    Integer,
    Money,
    Boolean,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Money(Money),
    Boolean(bool),
    Date(NaiveDate),
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
const CURRENCY_SYMBOLS: [char; 3] = ['$', '€', '£'];

impl CellValue {
    /// Coerce a raw cell. Blank cells are `Ok(None)`.
    pub fn coerce(raw: &str, kind: CellKind) -> Result<Option<CellValue>, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let value = match kind {
            CellKind::Text => CellValue::Text(raw.to_string()),
            CellKind::Integer => CellValue::Integer(parse_integer(raw)?),
            CellKind::Money => CellValue::Money(parse_money(raw)?),
            CellKind::Boolean => CellValue::Boolean(parse_bool(raw)?),
            CellKind::Date => CellValue::Date(parse_date(raw)?),
        };
        Ok(Some(value))
    }
}

/// Drops thousands separators (`,` or `_`). They may only split the digits
/// into groups of three, so a decimal comma such as `12,50` is refused.
fn strip_separators(digits: &str) -> Option<String> {
    let mut groups = digits.split([',', '_']);
    let first = groups.next().unwrap_or_default();
    let mut out = first.to_string();
    let mut grouped = false;
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
        grouped = true;
    }
    let lead = first.trim_start_matches('-').len();
    if grouped && !(1..=3).contains(&lead) {
        return None;
    }
    Some(out)
}

fn misplaced_separator(raw: &str) -> String {
    format!("'{raw}' has a misplaced thousands separator")
}

fn parse_integer(raw: &str) -> Result<i64, String> {
    strip_separators(raw)
        .ok_or_else(|| misplaced_separator(raw))?
        .parse::<i64>()
        .map_err(|_| format!("'{raw}' is not a whole number"))
}

fn parse_money(raw: &str) -> Result<Money, String> {
    let invalid = || format!("'{raw}' is not an amount");

    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, raw),
    };
    let rest = rest.strip_prefix(CURRENCY_SYMBOLS).unwrap_or(rest).trim_start();
    let (whole, frac) = rest.split_once('.').unwrap_or((rest, ""));
    let whole = strip_separators(whole).ok_or_else(|| misplaced_separator(raw))?;
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 2 {
        return Err(format!("'{raw}' has more than 2 decimals"));
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };
    let cents = whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(|| format!("'{raw}' is too large"))?;

    Ok(Money::from_cents(if negative { -cents } else { cents }))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        _ => Err(format!("'{raw}' is not yes/no")),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("'{raw}' is not a date (YYYY-MM-DD, DD/MM/YYYY or DD.MM.YYYY)"))
}
