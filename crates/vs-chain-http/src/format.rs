/// Renders an integer amount of base units with at most `precision` fractional digits.
/// Extra digits are truncated, never rounded, and trailing zeros are dropped.
pub fn format_units(raw: u128, decimals: u32, precision: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = raw / scale;
    let fraction = raw % scale;

    let digits = format!("{fraction:0width$}", width = decimals as usize);
    let kept = digits
        .get(..precision.min(decimals) as usize)
        .unwrap_or_default()
        .trim_end_matches('0');

    if kept.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{kept}")
    }
}

pub fn parse_hex_quantity(value: &str) -> Option<u128> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}
