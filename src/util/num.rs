//! PDF real-number formatting: compact fixed-point decimals, no exponents,
//! trailing zeros trimmed. PDF viewers are strict about this; `format!`'s
//! default float rendering (`1e2`, `1.5000000001`) is not acceptable.

/// Format a PDF real number with up to 6 fractional digits, trimming
/// trailing zeros and the decimal point itself when the value is integral.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    let mut s = format!("{:.6}", rounded);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Zero-pad a non-negative integer to exactly `width` decimal digits, used
/// for xref byte offsets and `/ByteRange` placeholder values.
pub fn pad_decimal(value: u64, width: usize) -> String {
    format!("{:0width$}", value, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_zeros() {
        assert_eq!(format_real(1.0), "1");
        assert_eq!(format_real(1.5), "1.5");
        assert_eq!(format_real(0.1), "0.1");
        assert_eq!(format_real(-0.0), "0");
    }

    #[test]
    fn pads_offsets() {
        assert_eq!(pad_decimal(42, 10), "0000000042");
        assert_eq!(pad_decimal(0, 10), "0000000000");
    }
}
