use crate::error::{HbError, Result};
use crate::habit::CountDirection;
use regex::Regex;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)\s*h)?\s*(?:(\d+)\s*m?)?$").unwrap()
});

static HEX_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#?([0-9a-fA-F]{6})$").unwrap()
});

/// Card colors offered by the UI, in cycling order. The empty value is the
/// theme's default card.
pub const PALETTE: &[(&str, &str)] = &[
    ("default", ""),
    ("slate", "#94A3B8"),
    ("lavender", "#A5B4FC"),
    ("periwinkle", "#C7D2FE"),
    ("coral", "#FCA5A5"),
    ("peach", "#FDBA74"),
    ("canary", "#FCD34D"),
    ("mint", "#86EFAC"),
    ("sky", "#67E8F9"),
    ("pink", "#F9A8D4"),
    ("lilac", "#C4B5FD"),
];

/// Timer length in minutes. `off`, `none` and `0` mean no timer.
///
/// Accepts `25`, `25m`, `1h`, `1h30m`.
pub fn parse_minutes(input: &str) -> Result<Option<u32>> {
    let input = input.trim().to_lowercase();
    if input == "off" || input == "none" {
        return Ok(None);
    }
    let invalid = || HbError::Parse(format!("invalid timer duration: {:?}", input));

    let caps = DURATION_RE.captures(&input).ok_or_else(invalid)?;
    if caps.get(1).is_none() && caps.get(2).is_none() {
        return Err(invalid());
    }
    let hours: u32 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).map_err(|_| invalid())?;
    let minutes: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).map_err(|_| invalid())?;
    let total = hours
        .checked_mul(60)
        .and_then(|h| h.checked_add(minutes))
        .ok_or_else(invalid)?;

    Ok((total > 0).then_some(total))
}

/// Normalize a palette name or hex value to `#RRGGBB` (or `""` for default).
pub fn parse_color(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(String::new());
    }
    if let Some((_, hex)) = PALETTE.iter().find(|(name, _)| name.eq_ignore_ascii_case(input)) {
        return Ok(hex.to_string());
    }
    let caps = HEX_COLOR_RE
        .captures(input)
        .ok_or_else(|| HbError::Parse(format!("invalid color: {:?}", input)))?;
    Ok(format!("#{}", caps[1].to_uppercase()))
}

/// The palette entry after `current`, wrapping around.
pub fn next_color(current: &str) -> &'static str {
    let idx = PALETTE
        .iter()
        .position(|(_, hex)| hex.eq_ignore_ascii_case(current))
        .map_or(0, |i| (i + 1) % PALETTE.len());
    PALETTE[idx].1
}

/// Whether dark text reads better than light text on this background.
pub fn is_light_color(hex: &str) -> bool {
    let Some(caps) = HEX_COLOR_RE.captures(hex) else {
        return false;
    };
    let rgb = u32::from_str_radix(&caps[1], 16).unwrap_or(0);
    let (r, g, b) = ((rgb >> 16) & 0xff, (rgb >> 8) & 0xff, rgb & 0xff);
    let luminance = (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)) / 255.0;
    luminance > 0.6
}

/// `(r, g, b)` for a `#RRGGBB` value.
pub fn rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let caps = HEX_COLOR_RE.captures(hex)?;
    let value = u32::from_str_radix(&caps[1], 16).ok()?;
    Some(((value >> 16) as u8, (value >> 8) as u8, value as u8))
}

pub fn parse_direction(input: &str) -> Result<CountDirection> {
    match input.trim().to_lowercase().as_str() {
        "up" | "+" => Ok(CountDirection::Up),
        "down" | "-" => Ok(CountDirection::Down),
        other => Err(HbError::Parse(format!(
            "count direction must be 'up' or 'down', got {:?}",
            other
        ))),
    }
}
