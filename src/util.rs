/// Row-major offset of `(n, c, h, w)` in a tensor of the given 4-d shape.
pub fn index_4d_to_1d(shape: &[usize], n: usize, c: usize, h: usize, w: usize) -> usize {
    let (channels, height, width) = (shape[1], shape[2], shape[3]);
    n * channels * height * width + c * height * width + h * width + w
}

/// Formats like a default `std::ostream` double: six significant digits,
/// `%g` style, trailing zeros dropped.
pub fn format_g(value: f64) -> String {
    const PRECISION: i32 = 6;

    if value == 0.0 {
        return "0".to_owned();
    }
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_owned()
        } else if value > 0.0 {
            "inf".to_owned()
        } else {
            "-inf".to_owned()
        };
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            strip_trailing_zeros(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, value)).to_owned()
    }
}

fn strip_trailing_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Whole microseconds, as printed by the trace analyzer.
pub fn format_us(value: f64) -> String {
    format!("{} us", value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_row_major() {
        let shape = [2, 3, 4, 5];

        assert_eq!(index_4d_to_1d(&shape, 0, 0, 0, 0), 0);
        assert_eq!(index_4d_to_1d(&shape, 0, 0, 1, 0), 5);
        assert_eq!(index_4d_to_1d(&shape, 1, 2, 3, 4), 119);
    }

    #[test]
    fn format_like_ostream() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(12.5), "12.5");
        assert_eq!(format_g(100.0), "100");
        assert_eq!(format_g(1234.5678), "1234.57");
        assert_eq!(format_g(123456.0), "123456");
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(0.00001234), "1.234e-05");
        assert_eq!(format_g(-3.25), "-3.25");
    }

    #[test]
    fn rounding_carries_into_exponent() {
        assert_eq!(format_g(999999.7), "1e+06");
        assert_eq!(format_g(9.9999999), "10");
    }

    #[test]
    fn whole_microseconds() {
        assert_eq!(format_us(1234.9), "1234 us");
    }
}
