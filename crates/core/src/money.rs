//! Amount helpers. All amounts are integer minor units (cents).

/// Total price of `quantity` tickets, or `None` on overflow.
pub fn order_total_cents(price_cents: i64, quantity: i32) -> Option<i64> {
    price_cents.checked_mul(i64::from(quantity))
}

/// Parse a decimal major-unit string such as `"12.50"` into cents.
///
/// Accepts at most two fractional digits; anything else is rejected rather
/// than rounded.
pub fn parse_decimal_cents(value: &str) -> Result<i64, String> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    let invalid = || format!("Invalid decimal amount '{value}'");
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };
    let cents = whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(invalid)?;
    Ok(if negative { -cents } else { cents })
}
