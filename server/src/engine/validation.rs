use chrono::Duration;
use regex::Regex;

use super::company::Visibility;
use super::error::{CompanyError, Result};

/// Maximum length of the user-supplied part of a company name.
pub const MAX_COMPANY_NAME_INPUT: usize = 40;

/// Maximum length of a stored company name, suffix included.
pub const MAX_COMPANY_NAME_LENGTH: usize = 65;

/// Validate a proposed company name and produce the stored form,
/// `"<Title Case> [<Visibility> Company]"`. Any form of the word
/// "company" is dropped from the input.
pub fn validate_company_name(raw: &str, visibility: Visibility) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CompanyError::InvalidInput(
            "Company name cannot be empty".into(),
        ));
    }
    if raw.chars().count() > MAX_COMPANY_NAME_INPUT {
        return Err(CompanyError::InvalidInput(format!(
            "Company name too long (max {} characters)",
            MAX_COMPANY_NAME_INPUT
        )));
    }
    if raw.chars().any(char::is_control) {
        return Err(CompanyError::InvalidInput(
            "Company name cannot contain control characters".into(),
        ));
    }

    let stripped = raw.to_lowercase().replace("company", " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(CompanyError::InvalidInput(
            "Company name needs more than the word \"company\"".into(),
        ));
    }

    let name = format!("{} [{} Company]", title_case(&collapsed), visibility.as_str());
    if name.chars().count() > MAX_COMPANY_NAME_LENGTH {
        return Err(CompanyError::InvalidInput(format!(
            "Company name too long (max {} characters)",
            MAX_COMPANY_NAME_LENGTH
        )));
    }
    Ok(name)
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// One pattern per unit, applied in this order. Each may match once.
const UNIT_PATTERNS: [(&str, i64); 5] = [
    (r"(?i)(\d+)\s*(?:seconds?|secs?|s)", 1),
    (r"(?i)(\d+)\s*(?:minutes?|mins?|m)", 60),
    (r"(?i)(\d+)\s*(?:hours?|hrs?|h)", 3_600),
    (r"(?i)(\d+)\s*(?:days?|d)", 86_400),
    (r"(?i)(\d+)\s*(?:weeks?|w)", 604_800),
];

/// Parse a war duration such as `"5 hours 30 minutes"` or `"2d 4h"`.
/// Units are separated by whitespace only and each may appear once; the
/// total must be positive.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |msg: String| CompanyError::InvalidInput(msg);
    if input.trim().is_empty() {
        return Err(invalid("Duration cannot be empty".into()));
    }

    let mut rest = input.to_string();
    let mut total: i64 = 0;
    for (pattern, seconds) in UNIT_PATTERNS {
        let re = Regex::new(pattern)
            .map_err(|e| invalid(format!("Bad duration pattern: {e}")))?;
        let Some((range, digits)) = re.captures(&rest).and_then(|caps| {
            let whole = caps.get(0)?;
            Some((whole.range(), caps.get(1)?.as_str().to_string()))
        }) else {
            continue;
        };
        let value: i64 = digits
            .parse()
            .map_err(|_| invalid(format!("Duration value '{digits}' is too large")))?;
        total = value
            .checked_mul(seconds)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(|| invalid("Duration is too large".into()))?;

        rest.replace_range(range, " ");
    }

    // Anything left over is a repeated unit, an unknown unit or a stray
    // separator.
    let leftover = rest.trim();
    if !leftover.is_empty() {
        return Err(invalid(format!(
            "Failed to parse duration input '{leftover}'. Might be duplicate or invalid"
        )));
    }
    if total <= 0 {
        return Err(invalid("Duration must be greater than zero".into()));
    }
    Duration::try_seconds(total).ok_or_else(|| invalid("Duration is too large".into()))
}
