use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Canonicalize a user-typed amount.
///
/// Accepts an optional sign, digits, and at most one decimal separator
/// (`.` or `,`) followed by one or two digits. Interior spaces (thousands
/// spacing) are removed first. Integers are canonicalized numerically;
/// decimals keep the user's spelling, separator included, so the stamped
/// value reads exactly as typed. A `+` is dropped, a `-` is kept.
pub fn normalize_amount(raw: &str) -> Option<String> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ' ').collect();
    if cleaned.is_empty() {
        return None;
    }

    let (negative, body) = if let Some(rest) = cleaned.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = cleaned.strip_prefix('+') {
        (false, rest)
    } else {
        (false, cleaned.as_str())
    };

    let bytes = body.as_bytes();
    let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if int_len == 0 {
        return None;
    }

    if int_len == bytes.len() {
        // Pure integer: strip leading zeros. The sign survives even on zero,
        // so "-000" stays "-0".
        let digits = body.trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        if negative {
            return Some(format!("-{digits}"));
        }
        return Some(digits.to_string());
    }

    let sep = bytes[int_len];
    if sep != b'.' && sep != b',' {
        return None;
    }
    let frac = &bytes[int_len + 1..];
    if frac.is_empty() || frac.len() > 2 || !frac.iter().all(u8::is_ascii_digit) {
        return None;
    }

    if negative {
        Some(format!("-{body}"))
    } else {
        Some(body.to_string())
    }
}

/// Spaced-sign form used only for drawing: `"- 320"` / `"+ 320"`.
pub fn format_amount_display(canonical: &str) -> String {
    match canonical.strip_prefix('-') {
        Some(body) => format!("- {body}"),
        None => format!("+ {canonical}"),
    }
}

/// Strict parse of a timestamp against the configured strftime pattern.
///
/// Patterns that carry only date fields resolve to midnight; patterns that
/// carry only time fields resolve onto 1970-01-01. The caller re-formats the
/// result with the same pattern, so the stamped text is always canonical.
pub fn parse_time(raw: &str, pattern: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, pattern) {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(time) = NaiveTime::parse_from_str(trimmed, pattern) {
        return NaiveDate::from_ymd_opt(1970, 1, 1).map(|d| d.and_time(time));
    }
    None
}

/// Format a timestamp with a config-supplied pattern without panicking on a
/// malformed pattern (chrono's `Display` would).
pub fn format_time(ts: NaiveDateTime, pattern: &str) -> Option<String> {
    use std::fmt::Write as _;
    let mut out = String::new();
    write!(out, "{}", ts.format(pattern)).ok()?;
    Some(out)
}

/// Fixed reference timestamp rendered with the live pattern to produce the
/// worked example shown in prompts.
pub fn example_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 10, 16)
        .and_then(|d| d.and_hms_opt(16, 42, 14))
        .unwrap_or_default()
}
