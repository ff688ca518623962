//! American odds arithmetic and formatting.

/// ASCII hyphen plus the dash glyphs sportsbooks and search snippets use as
/// a minus sign (U+2212 minus, U+2013 en dash, U+2014 em dash).
pub fn is_minus_glyph(c: char) -> bool {
    matches!(c, '-' | '\u{2212}' | '\u{2013}' | '\u{2014}')
}

/// Probability implied by an American price (bookmaker margin included).
pub fn implied_probability(american: i32) -> f64 {
    let odds = american as f64;
    if american > 0 {
        100.0 / (odds + 100.0)
    } else {
        odds.abs() / (odds.abs() + 100.0)
    }
}

/// `+150` / `-150`; zero is not a valid price and renders as `N/A`.
pub fn format_american(american: i32) -> String {
    match american {
        0 => "N/A".to_string(),
        a if a > 0 => format!("+{a}"),
        a => a.to_string(),
    }
}

/// Parse a loosely formatted American price such as `"+150"`, `"−150"` or
/// the composite `"-132 / +200"` (first price wins).
pub fn parse_american(text: &str) -> Option<i32> {
    let first = text.split('/').next()?.trim();
    let cleaned: String = first
        .chars()
        .map(|c| if is_minus_glyph(c) { '-' } else { c })
        .filter(|c| c.is_ascii_digit() || *c == '+' || *c == '-')
        .collect();
    let value: i32 = cleaned.parse().ok()?;
    (value != 0).then_some(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
