//! 価格テキスト解析モジュール
//!
//! 優先順位: 小份/大份の二段価格 > 「元」付きの金額 > 数字のみ。
//! 最初に一致したパターンの結果だけを使う。
//! 全角数字・全角小数点は照合前に半角へ揃える。

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

static RE_TWO_TIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"小份[^\d]*(\d+\.?\d*)[^\d]*[，,]\s*大份[^\d]*(\d+\.?\d*)").unwrap());
static RE_CURRENCY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.?\d*)元").unwrap());
static RE_BARE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.?\d*)").unwrap());
static RE_ANY_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9]+)").unwrap());

/// 数値文字列を抜き出すマッチャー
type Matcher = fn(&str) -> Vec<String>;

/// 優先度順のマッチャー一覧
const MATCHERS: [(&str, Matcher); 3] = [
    ("two_tier", match_two_tier),
    ("currency", match_currency_suffixed),
    ("bare", match_bare_numerals),
];

/// 価格の解析結果
///
/// 数字が見つからなければ min/max とも `None`。0 などの既定値は呼び出し側で決める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPrice {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub original_text: String,
}

impl ParsedPrice {
    /// 価格が一つも取れなかったか
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    /// 取れなかった場合は 0 を使う
    pub fn or_zero(&self) -> (Decimal, Decimal) {
        (
            self.min.unwrap_or(Decimal::ZERO),
            self.max.unwrap_or(Decimal::ZERO),
        )
    }
}

/// 価格テキストを (最小, 最大, 元テキスト) に解析
pub fn parse_price(text: &str) -> ParsedPrice {
    let normalized = to_halfwidth_digits(text);
    let numerals = MATCHERS
        .iter()
        .find_map(|(name, matcher)| {
            let found = matcher(&normalized);
            (!found.is_empty()).then(|| {
                debug!(matcher = *name, count = found.len(), "価格パターン一致");
                found
            })
        })
        .unwrap_or_default();

    let mut prices = to_decimals(&numerals);

    // どのパターンでも数値にならなければ数字の並びをすべて拾う
    if prices.is_empty() {
        prices = to_decimals(&match_any_digits(&normalized));
    }

    ParsedPrice {
        min: prices.iter().min().copied(),
        max: prices.iter().max().copied(),
        original_text: text.to_string(),
    }
}

/// ０-９ と ．を半角にする
fn to_halfwidth_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            '．' => '.',
            other => other,
        })
        .collect()
}

/// 変換できないものは捨てる
fn to_decimals(numerals: &[String]) -> Vec<Decimal> {
    numerals
        .iter()
        .filter_map(|n| Decimal::from_str(n.trim_end_matches('.')).ok())
        .collect()
}

/// 全キャプチャグループを出現順に集める
fn capture_groups(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .flat_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 小份X元，大份Y元
fn match_two_tier(text: &str) -> Vec<String> {
    capture_groups(&RE_TWO_TIER, text)
}

/// X元
fn match_currency_suffixed(text: &str) -> Vec<String> {
    capture_groups(&RE_CURRENCY, text)
}

/// 数字のみ
fn match_bare_numerals(text: &str) -> Vec<String> {
    capture_groups(&RE_BARE, text)
}

/// 最後の手段: 半角数字の並び
fn match_any_digits(text: &str) -> Vec<String> {
    capture_groups(&RE_ANY_DIGITS, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn range(text: &str) -> (Option<Decimal>, Option<Decimal>) {
        let parsed = parse_price(text);
        assert_eq!(parsed.original_text, text);
        (parsed.min, parsed.max)
    }

    #[test]
    fn two_tier_price() {
        assert_eq!(range("小份8元，大份15元"), (Some(dec("8")), Some(dec("15"))));
    }

    #[test]
    fn two_tier_in_reverse_magnitude() {
        assert_eq!(range("小份20元, 大份12元"), (Some(dec("12")), Some(dec("20"))));
    }

    #[test]
    fn two_tier_wins_over_other_numbers() {
        // 「3人份」の3は二段価格が一致した時点で無視される
        assert_eq!(range("3人份 小份28元，大份48元"), (Some(dec("28")), Some(dec("48"))));
    }

    #[test]
    fn single_currency_amount() {
        assert_eq!(range("25元"), (Some(dec("25")), Some(dec("25"))));
    }

    #[test]
    fn currency_amounts_ignore_bare_numbers() {
        assert_eq!(range("2人 38元/例 68元/份"), (Some(dec("38")), Some(dec("68"))));
    }

    #[test]
    fn bare_numeral_fallback() {
        assert_eq!(range("12.5"), (Some(dec("12.5")), Some(dec("12.5"))));
        assert_eq!(range("¥ 18 / 22"), (Some(dec("18")), Some(dec("22"))));
    }

    #[test]
    fn trailing_dot_is_accepted() {
        assert_eq!(range("8.元"), (Some(dec("8")), Some(dec("8"))));
    }

    #[test]
    fn fullwidth_digits_are_read() {
        assert_eq!(range("１５元"), (Some(dec("15")), Some(dec("15"))));
        assert_eq!(range("小份８元，大份１５元"), (Some(dec("8")), Some(dec("15"))));
        assert_eq!(range("１２．５"), (Some(dec("12.5")), Some(dec("12.5"))));
    }

    #[test]
    fn fullwidth_text_is_kept_as_original() {
        assert_eq!(parse_price("２０元").original_text, "２０元");
    }

    #[test]
    fn no_digits_gives_empty_range() {
        let parsed = parse_price("时价");
        assert!(parsed.is_empty());
        assert_eq!(parsed.max, None);
        assert_eq!(parsed.original_text, "时价");
        assert_eq!(parsed.or_zero(), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn min_never_exceeds_max() {
        for text in ["小份8元，大份15元", "30元 10元 20元", "7 3 5", "99", "无", "小份 9.5，大份 6"] {
            let (min, max) = parse_price(text).or_zero();
            assert!(min <= max, "{text}");
        }
    }
}
