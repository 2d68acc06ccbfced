// 💰 Money - Fixed-point amounts in integer cents
// Every sum, difference and fee computation runs on i64 minor units.
// Decimal text only exists at the parsing and formatting boundaries.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// The single local currency handled by the reconciliation core.
pub const LOCAL_CURRENCY: &str = "CHF";

// ============================================================================
// MONEY
// ============================================================================

/// Amount in minor units (cents). Serializes as a plain integer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute distance to another amount, in cents
    pub fn distance(self, other: Money) -> i64 {
        (self.0 - other.0).abs()
    }

    /// Parse an amount written with either comma or dot as decimal separator.
    ///
    /// Accepted: `45.00`, `45,00`, `1'234.50`, `1.234,50`, `1,234.50`, `CHF 12.5`.
    /// Rejected as ambiguous: a single separator followed by exactly three
    /// digits (`1,234` could be 1234 or 1.234), more than two decimals.
    pub fn parse_localized(raw: &str) -> Result<Money> {
        let cleaned: String = strip_currency(raw)
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '\u{2019}')
            .collect();

        let (negative, body) = split_sign(&cleaned);
        if body.is_empty() {
            bail!("empty amount");
        }
        if let Some(bad) = body.chars().find(|c| !c.is_ascii_digit() && *c != ',' && *c != '.') {
            bail!("unexpected character '{}' in amount '{}'", bad, raw.trim());
        }

        let last_comma = body.rfind(',');
        let last_dot = body.rfind('.');

        let (int_part, frac_part) = match (last_comma, last_dot) {
            (Some(c), Some(d)) => {
                let decimal_at = c.max(d);
                let decimal_sep = if decimal_at == c { ',' } else { '.' };
                let group_sep = if decimal_sep == ',' { '.' } else { ',' };
                let int_part = &body[..decimal_at];
                if int_part.contains(decimal_sep) {
                    bail!("ambiguous amount '{}': repeated decimal separator", raw.trim());
                }
                (ungroup(int_part, group_sep, raw)?, &body[decimal_at + 1..])
            }
            (Some(p), None) | (None, Some(p)) => {
                let sep = if last_comma.is_some() { ',' } else { '.' };
                if body.matches(sep).count() > 1 {
                    // Only thousands grouping, no decimals: 1.234.567
                    (ungroup(body, sep, raw)?, "")
                } else {
                    let frac = &body[p + 1..];
                    match frac.len() {
                        1 | 2 => (body[..p].to_string(), frac),
                        3 => bail!(
                            "ambiguous amount '{}': '{}' may be a thousands separator",
                            raw.trim(),
                            sep
                        ),
                        0 => bail!("amount '{}' ends with a separator", raw.trim()),
                        _ => bail!("amount '{}' has more than two decimals", raw.trim()),
                    }
                }
            }
            (None, None) => (body.to_string(), ""),
        };

        if frac_part.len() > 2 {
            bail!("amount '{}' has more than two decimals", raw.trim());
        }
        if frac_part.is_empty() && (last_comma.is_some() && last_dot.is_some()) {
            bail!("amount '{}' ends with a separator", raw.trim());
        }

        to_cents(negative, &int_part, frac_part)
            .with_context(|| format!("invalid amount '{}'", raw.trim()))
    }

    /// Parse a plain machine-formatted amount (`1234.56`, dot only, no grouping).
    /// Extra decimals are tolerated only when they are zeros (`45.000`).
    pub fn parse_plain(raw: &str) -> Result<Money> {
        let trimmed = raw.trim();
        let (negative, body) = split_sign(trimmed);
        if body.is_empty() {
            bail!("empty amount");
        }

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        let significant = frac_part.trim_end_matches('0');
        if significant.len() > 2 {
            bail!("amount '{}' has more than two significant decimals", trimmed);
        }
        let frac = if frac_part.len() > 2 { &frac_part[..2] } else { frac_part };

        to_cents(negative, int_part, frac).with_context(|| format!("invalid amount '{}'", trimmed))
    }
}

fn strip_currency(raw: &str) -> &str {
    let s = raw.trim().trim_matches('"').trim();
    let s = s.strip_prefix(LOCAL_CURRENCY).unwrap_or(s);
    s.strip_suffix(LOCAL_CURRENCY).unwrap_or(s)
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

/// Validate thousands grouping (`1.234.567`) and return the bare digits
fn ungroup(int_part: &str, group_sep: char, raw: &str) -> Result<String> {
    if !int_part.contains(group_sep) {
        return Ok(int_part.to_string());
    }
    let groups: Vec<&str> = int_part.split(group_sep).collect();
    let first_ok = (1..=3).contains(&groups[0].len());
    let rest_ok = groups[1..].iter().all(|g| g.len() == 3);
    if !first_ok || !rest_ok {
        bail!("malformed digit grouping in amount '{}'", raw.trim());
    }
    Ok(groups.concat())
}

fn to_cents(negative: bool, int_part: &str, frac_part: &str) -> Result<Money> {
    if int_part.is_empty() && frac_part.is_empty() {
        bail!("no digits");
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        bail!("non-digit characters");
    }

    let units: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().context("integer part out of range")?
    };
    let cents: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>()? * 10,
        _ => frac_part.parse::<i64>()?,
    };

    let total = units
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .context("amount out of range")?;

    Ok(Money(if negative { -total } else { total }))
}

// ============================================================================
// ARITHMETIC
// ============================================================================

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// ============================================================================
// TESTS
// ============================================================================
