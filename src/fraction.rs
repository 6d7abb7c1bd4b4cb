use crate::metadata::{ExifScalar, ExifValue};

/// Decodes an EXIF rational in any of the shapes it shows up in.
///
/// Numbers are taken as-is, `"num/den"` text is divided, plain numeric text
/// is parsed and `{num, den}` pairs are divided. A zero denominator or any
/// other shape yields `None`.
pub fn fraction_to_f64(value: &ExifScalar) -> Option<f64> {
    match value {
        ExifScalar::Int(n) => Some(*n as f64),
        ExifScalar::Float(n) => Some(*n),
        ExifScalar::Text(s) => parse_fraction(s),
        ExifScalar::Ratio { num, den } => {
            if *den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
    }
}

/// Same as [`fraction_to_f64`] for a catalog value; sequences never decode.
pub fn value_to_f64(value: &ExifValue) -> Option<f64> {
    value.as_scalar().and_then(fraction_to_f64)
}

pub fn parse_fraction(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.split('/').collect();
    if parts.len() == 2 {
        if let (Some(num), Some(den)) = (parse_number(parts[0]), parse_number(parts[1])) {
            if den != 0.0 {
                return Some(num / den);
            }
        }
    }
    parse_number(text)
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_pass_through() {
        assert_eq!(fraction_to_f64(&ExifScalar::Int(42)), Some(42.0));
        assert_eq!(fraction_to_f64(&ExifScalar::Float(2.5)), Some(2.5));
        assert_eq!(fraction_to_f64(&ExifScalar::text("12.25")), Some(12.25));
    }

    #[test]
    fn fraction_strings_divide_exactly() {
        for (num, den) in [(1i64, 3i64), (3000, 100), (-7, 2), (0, 5), (22, 7)] {
            let text = format!("{}/{}", num, den);
            assert_eq!(parse_fraction(&text), Some(num as f64 / den as f64), "{}", text);
        }
    }

    #[test]
    fn zero_denominator_is_none() {
        assert_eq!(parse_fraction("5/0"), None);
        assert_eq!(fraction_to_f64(&ExifScalar::Ratio { num: 5.0, den: 0.0 }), None);
    }

    #[test]
    fn ratio_pairs_divide() {
        assert_eq!(fraction_to_f64(&ExifScalar::Ratio { num: 3.0, den: 4.0 }), Some(0.75));
    }

    #[test]
    fn junk_is_none() {
        assert_eq!(parse_fraction(""), None);
        assert_eq!(parse_fraction("abc"), None);
        assert_eq!(parse_fraction("1/2/3"), None);
        assert_eq!(parse_fraction("a/2"), None);
        assert_eq!(parse_fraction("inf"), None);
        assert_eq!(value_to_f64(&ExifValue::List(vec![ExifScalar::Int(1)])), None);
    }
}
