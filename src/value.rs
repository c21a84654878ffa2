//! The tagged value the evaluator passes around (spec §3, §9: "Value
//! polymorphism without inheritance", one enum, branch by variant rather
//! than a `VariableValue`/`NumericValue`/`StringValue` class hierarchy).

use crate::error::BasicError;

pub const MAX_STRING_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    /// Produced only by the `TAB(...)` pseudo-function; consumable only
    /// by `PRINT`. Fails every type check elsewhere.
    Tab(i16),
    /// Produced only by `SPC(...)`; same restriction as `Tab`.
    Spc(i16),
}

impl Value {
    pub fn as_number(&self) -> Result<f64, BasicError> {
        match self {
            Value::Number(n) => Ok(*n),
            _ => Err(BasicError::TypeMismatch),
        }
    }

    pub fn as_str(&self) -> Result<&str, BasicError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(BasicError::TypeMismatch),
        }
    }

    pub fn into_string(self) -> Result<String, BasicError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(BasicError::TypeMismatch),
        }
    }

    /// Narrow to a 16-bit signed two's-complement integer, as required
    /// for `POKE`, `PEEK`, `TAB`, `SPC`, and array subscripts (spec
    /// §4.2). Out-of-range values are `ILLEGAL QUANTITY`, not `OVERFLOW`:
    /// spec §4.2 is explicit that narrowing failures raise `FC`.
    pub fn as_i16(&self) -> Result<i16, BasicError> {
        let n = self.as_number()?;
        if !n.is_finite() {
            return Err(BasicError::IllegalQuantity);
        }
        let truncated = n.trunc();
        if truncated < i16::MIN as f64 || truncated > i16::MAX as f64 {
            return Err(BasicError::IllegalQuantity);
        }
        Ok(truncated as i16)
    }

    /// Non-negative narrowing used for array dimensions / subscripts,
    /// which additionally reject negative indices.
    pub fn as_index(&self) -> Result<u16, BasicError> {
        let n = self.as_i16()?;
        if n < 0 {
            return Err(BasicError::IllegalQuantity);
        }
        Ok(n as u16)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tab(_) | Value::Spc(_) => false,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    /// Default (zero-initialized) value for a freshly created variable of
    /// the given kind.
    pub fn default_for(is_string: bool) -> Value {
        if is_string {
            Value::Str(String::new())
        } else {
            Value::Number(0.0)
        }
    }

    /// Render the way `PRINT` and `STR$` do: numbers get a leading space
    /// when non-negative (sign column), integral values print without a
    /// fractional part, and everything is capped to nine significant
    /// digits past the decimal point like the real ROM.
    pub fn to_display_string(&self) -> Result<String, BasicError> {
        match self {
            Value::Number(n) => Ok(format_number(*n)),
            Value::Str(s) => Ok(s.clone()),
            Value::Tab(_) | Value::Spc(_) => Err(BasicError::TypeMismatch),
        }
    }
}

pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return if n.is_nan() {
            "NAN".to_string()
        } else if n > 0.0 {
            " OVERFLOW".to_string()
        } else {
            "-OVERFLOW".to_string()
        };
    }

    let magnitude = if n.fract() == 0.0 && n.abs() < 1e10 {
        format!("{}", n as i64)
    } else {
        let s = format!("{:.9}", n);
        let s = if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        };
        // C64 BASIC suppresses the leading zero of a fraction: ".5", not "0.5".
        if let Some(rest) = s.strip_prefix("0.") {
            format!(".{}", rest)
        } else if let Some(rest) = s.strip_prefix("-0.") {
            format!("-.{}", rest)
        } else {
            s
        }
    };

    if n >= 0.0 {
        format!(" {}", magnitude)
    } else {
        magnitude
    }
}

/// `VAL`-like parse: consume a leading numeric prefix (optional sign,
/// digits, decimal point, exponent with its own optional sign) after
/// skipping leading whitespace. A non-numeric prefix yields `0.0`, never
/// an error. Shared by `VAL` and by `READ`'s conversion of a `DATA`
/// literal into a numeric var. Mirrors the number-literal scanner in
/// `eval.rs` so `1E-5` and `1.5E+3` parse the same way in both places.
pub fn parse_numeric_prefix(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        i += 1;
    }
    while bytes.get(i).map_or(false, |b| b.is_ascii_digit()) {
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while bytes.get(i).map_or(false, |b| b.is_ascii_digit()) {
            i += 1;
        }
    }
    if matches!(bytes.get(i), Some(b'E') | Some(b'e')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        if bytes.get(j).map_or(false, |b| b.is_ascii_digit()) {
            while bytes.get(j).map_or(false, |b| b.is_ascii_digit()) {
                j += 1;
            }
            i = j;
        }
    }
    trimmed[..i].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_numbers_get_a_leading_space() {
        assert_eq!(format_number(1.0), " 1");
        assert_eq!(format_number(-1.0), "-1");
        assert_eq!(format_number(0.0), " 0");
    }

    #[test]
    fn fractional_values_trim_trailing_zeros() {
        assert_eq!(format_number(0.5), " .5");
        assert_eq!(format_number(3.25), " 3.25");
    }

    #[test]
    fn as_i16_rejects_out_of_range() {
        let v = Value::Number(100000.0);
        assert_eq!(v.as_i16(), Err(BasicError::IllegalQuantity));
    }

    #[test]
    fn parse_numeric_prefix_accepts_a_negative_exponent() {
        assert_eq!(parse_numeric_prefix("1E-5"), 0.00001);
        assert_eq!(parse_numeric_prefix("1.5E+3"), 1500.0);
    }

    #[test]
    fn tab_marker_fails_arithmetic_type_checks() {
        let v = Value::Tab(5);
        assert_eq!(v.as_number(), Err(BasicError::TypeMismatch));
        assert!(!v.is_truthy());
    }
}
