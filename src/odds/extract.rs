//! Odds extraction from unstructured search text.
//!
//! Search providers return prose and snippets such as
//! `"Jon Jones −250 | Stipe Miocic +200"` or `"Over 2.5 rounds -140"`.
//! This module pulls American prices out of that text line by line.

use tracing::debug;

use super::convert::is_minus_glyph;
use crate::types::{OddsQuote, SourceTier, Totals};

/// Provenance attached by the extractor; callers usually overwrite it with
/// the provider that produced the text.
pub const EXTRACTION_PROVENANCE: &str = "text-extraction";

/// Extract a quote for `fighter_a` vs `fighter_b` from free text.
///
/// Returns `None` unless a moneyline is found for *both* fighters. Totals
/// are optional and extracted independently.
pub fn extract(text: &str, fighter_a: &str, fighter_b: &str) -> Option<OddsQuote> {
    let (moneyline_a, moneyline_b) = extract_moneylines(text, fighter_a, fighter_b)?;
    let totals = extract_totals(text);

    debug!(
        fighter_a,
        fighter_b,
        moneyline_a,
        moneyline_b,
        has_totals = totals.is_some(),
        "Extracted odds from text"
    );

    Some(OddsQuote {
        moneyline_a,
        moneyline_b,
        totals,
        source_tier: SourceTier::External,
        provenance: EXTRACTION_PROVENANCE.to_string(),
    })
}

/// Find a moneyline for each fighter. Lines naming a fighter without a
/// price are skipped and the scan continues.
fn extract_moneylines(text: &str, fighter_a: &str, fighter_b: &str) -> Option<(i32, i32)> {
    let name_a = fighter_a.trim().to_lowercase();
    let name_b = fighter_b.trim().to_lowercase();
    if name_a.is_empty() || name_b.is_empty() {
        return None;
    }

    let mut odds_a: Option<i32> = None;
    let mut odds_b: Option<i32> = None;

    for line in text.lines() {
        let lower = line.to_lowercase();

        if odds_a.is_none() {
            odds_a = odds_for_name(&lower, &name_a);
        }
        if odds_b.is_none() {
            odds_b = odds_for_name(&lower, &name_b);
        }
        if odds_a.is_some() && odds_b.is_some() {
            break;
        }
    }

    Some((odds_a?, odds_b?))
}

/// Price for a name on one (lowercased) line: the first price after the
/// name, else the first price anywhere on the line.
fn odds_for_name(lower_line: &str, name: &str) -> Option<i32> {
    let pos = lower_line.find(name)?;
    let tokens = odds_tokens(lower_line);
    tokens
        .iter()
        .find(|(at, _)| *at >= pos + name.len())
        .or_else(|| tokens.first())
        .map(|(_, value)| *value)
}

/// Extract an over/under rounds line with both prices.
fn extract_totals(text: &str) -> Option<Totals> {
    for line in text.lines() {
        let lower = line.to_lowercase();

        let over_at = keyword_end(&lower, "over").or_else(|| compact_total_end(&lower, 'o'));
        let under_at = keyword_end(&lower, "under").or_else(|| compact_total_end(&lower, 'u'));
        if over_at.is_none() && under_at.is_none() {
            continue;
        }

        let Some(line_value) = half_line(&lower) else {
            continue;
        };

        let tokens = odds_tokens(&lower);
        let after = |from: Option<usize>| {
            from.and_then(|f| tokens.iter().find(|(at, _)| *at >= f).map(|(_, v)| *v))
        };

        if let (Some(over), Some(under)) = (after(over_at), after(under_at)) {
            return Some(Totals {
                line: line_value,
                over,
                under,
            });
        }
    }
    None
}

/// Byte offset just past the first occurrence of `word`.
fn keyword_end(lower: &str, word: &str) -> Option<usize> {
    lower.find(word).map(|p| p + word.len())
}

/// Compact notation such as `o2.5` / `u1.5`. Returns the byte offset just
/// past the half-integer. The prefix must not continue a word (`"two2.5"`).
fn compact_total_end(lower: &str, prefix: char) -> Option<usize> {
    let mut prev: Option<char> = None;
    for (i, c) in lower.char_indices() {
        if c == prefix && !prev.map(|p| p.is_alphanumeric()).unwrap_or(false) {
            let rest = &lower[i + c.len_utf8()..];
            if let Some(len) = half_integer_len(rest) {
                return Some(i + c.len_utf8() + len);
            }
        }
        prev = Some(c);
    }
    None
}

/// First half-integer (`2.5`, `10.5`) on the line.
fn half_line(lower: &str) -> Option<f64> {
    let bytes = lower.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() && (i == 0 || !bytes[i - 1].is_ascii_digit()) {
            if let Some(len) = half_integer_len(&lower[i..]) {
                return lower[i..i + len].parse().ok();
            }
        }
        i += 1;
    }
    None
}

/// Length of a leading `\d+\.5` match.
fn half_integer_len(s: &str) -> Option<usize> {
    let digits = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    s[digits..].starts_with(".5").then_some(digits + 2)
}

/// All signed 3+-digit prices on a line, with the byte offset of the sign.
///
/// A hyphen directly after a digit is a range separator (`2024-2025`),
/// not a sign.
fn odds_tokens(line: &str) -> Vec<(usize, i32)> {
    let mut tokens = Vec::new();
    let mut prev: Option<char> = None;
    let mut iter = line.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let is_sign = c == '+' || is_minus_glyph(c);
        let after_digit = prev.map(|p| p.is_ascii_digit()).unwrap_or(false);
        prev = Some(c);

        if !is_sign || (c == '-' && after_digit) {
            continue;
        }

        let start = i + c.len_utf8();
        let digits = line[start..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits < 3 {
            continue;
        }

        if let Ok(magnitude) = line[start..start + digits].parse::<i32>() {
            let value = if c == '+' { magnitude } else { -magnitude };
            tokens.push((i, value));
        }

        // Skip the digits we just consumed.
        while let Some((_, d)) = iter.peek() {
            if d.is_ascii_digit() {
                prev = Some(*d);
                iter.next();
            } else {
                break;
            }
        }
    }

    tokens
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_lines() {
        let text = "UFC 309 odds at DraftKings\nJon Jones -250\nStipe Miocic +200\n";
        let q = extract(text, "Jon Jones", "Stipe Miocic").unwrap();
        assert_eq!((q.moneyline_a, q.moneyline_b), (-250, 200));
        assert_eq!(q.source_tier, SourceTier::External);
        assert!(q.totals.is_none());
    }

    #[test]
    fn test_extract_unicode_minus_and_case() {
        let text = "JON JONES \u{2212}250 | stipe miocic +200";
        let q = extract(text, "Jon Jones", "Stipe Miocic").unwrap();
        assert_eq!((q.moneyline_a, q.moneyline_b), (-250, 200));

        let text = "Jones \u{2013}180\nMiocic \u{2014}110";
        let q = extract(text, "Jones", "Miocic").unwrap();
        assert_eq!((q.moneyline_a, q.moneyline_b), (-180, -110));
    }

    #[test]
    fn test_extract_both_names_on_one_line() {
        let text = "Stipe Miocic +200 vs Jon Jones -250";
        let q = extract(text, "Jon Jones", "Stipe Miocic").unwrap();
        assert_eq!((q.moneyline_a, q.moneyline_b), (-250, 200));
    }

    #[test]
    fn test_name_without_price_keeps_scanning() {
        let text = "Jon Jones returns to defend his title\nStipe Miocic +200\nJon Jones -250";
        let q = extract(text, "Jon Jones", "Stipe Miocic").unwrap();
        assert_eq!(q.moneyline_a, -250);
    }

    #[test]
    fn test_missing_fighter_fails_whole_extraction() {
        let text = "Jon Jones -250\nNo line posted for the other side";
        assert!(extract(text, "Jon Jones", "Stipe Miocic").is_none());
        assert!(extract("", "Jon Jones", "Stipe Miocic").is_none());
        assert!(extract("anything -150", "", "Stipe").is_none());
    }

    #[test]
    fn test_ignores_short_numbers_and_ranges() {
        let text = "Jon Jones (2024-2025 record) -99 then -250\nStipe Miocic 200 and +175";
        let q = extract(text, "Jon Jones", "Stipe Miocic").unwrap();
        assert_eq!((q.moneyline_a, q.moneyline_b), (-250, 175));
    }

    #[test]
    fn test_extract_totals_words() {
        let text = "Jones -250\nMiocic +200\nOver 2.5 rounds -140, Under 2.5 rounds +110";
        let q = extract(text, "Jones", "Miocic").unwrap();
        let t = q.totals.unwrap();
        assert_eq!(t.line, 2.5);
        assert_eq!((t.over, t.under), (-140, 110));
    }

    #[test]
    fn test_extract_totals_compact() {
        let t = extract_totals("Totals: O1.5 \u{2212}125 / U1.5 +105").unwrap();
        assert_eq!(t.line, 1.5);
        assert_eq!((t.over, t.under), (-125, 105));
    }

    #[test]
    fn test_totals_need_both_prices() {
        assert!(extract_totals("Over 2.5 rounds -140").is_none());
        assert!(extract_totals("Over the years he has improved").is_none());
    }

    #[test]
    fn test_odds_tokens_offsets() {
        let tokens = odds_tokens("a +150 b -200");
        assert_eq!(tokens, vec![(2, 150), (9, -200)]);
    }
}
