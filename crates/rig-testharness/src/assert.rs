//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Assertion helpers producing diagnosable failures."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
//! Assertions return `Err(AssertionFailure)` instead of panicking, so a
//! failed check ends only the enclosing test once it is propagated with `?`.

use std::fmt::{self, Debug};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AssertResult<T = ()> = std::result::Result<T, AssertionFailure>;

/// A failed check, with the rendered actual and expected values when the
/// assertion compares two of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}{}", mismatch_suffix(.actual, .expected))]
pub struct AssertionFailure {
    pub message: String,
    pub actual: Option<String>,
    pub expected: Option<String>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            actual: None,
            expected: None,
        }
    }

    fn mismatch(message: impl Into<String>, actual: String, expected: String) -> Self {
        Self {
            message: message.into(),
            actual: Some(actual),
            expected: Some(expected),
        }
    }
}

fn mismatch_suffix(actual: &Option<String>, expected: &Option<String>) -> String {
    match (actual, expected) {
        (Some(actual), Some(expected)) => format!(" (expected {expected}, actual {actual})"),
        _ => String::new(),
    }
}

pub fn assert_equals<A, E>(actual: A, expected: E, message: impl Into<String>) -> AssertResult
where
    A: PartialEq<E> + Debug,
    E: Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(
            message,
            format!("{actual:?}"),
            format!("{expected:?}"),
        ))
    }
}

pub fn assert_true(condition: bool, message: impl Into<String>) -> AssertResult {
    if condition {
        Ok(())
    } else {
        Err(AssertionFailure::new(message))
    }
}

/// Unwraps `value`, failing when it is absent.
pub fn assert_not_null<T>(value: Option<T>, message: impl Into<String>) -> AssertResult<T> {
    value.ok_or_else(|| AssertionFailure::new(message))
}

/// Numeric value compared by mathematical value rather than by type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

macro_rules! number_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Number {
            fn from(value: $ty) -> Self {
                Number::Int(value as i128)
            }
        })*
    };
}

number_from_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f32> for Number {
    fn from(value: f32) -> Self {
        Number::Float(f64::from(value))
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl Number {
    fn same_value(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Int(int), Number::Float(float)) | (Number::Float(float), Number::Int(int)) => {
                float.is_finite() && float.fract() == 0.0 && float == int as f64 && float as i128 == int
            }
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Compares two numbers of possibly different primitive types.
///
/// `usize` counts compare against `i32` literals, and an integral float
/// equals the matching integer. No value is truncated along the way.
pub fn assert_number_equals(
    actual: impl Into<Number>,
    expected: impl Into<Number>,
    message: impl Into<String>,
) -> AssertResult {
    let (actual, expected) = (actual.into(), expected.into());
    if actual.same_value(expected) {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(
            message,
            actual.to_string(),
            expected.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_reports_both_values() {
        assert!(assert_equals(Some("a"), Some("a"), "same").is_ok());
        let failure = assert_equals(Some("old"), Some("new"), "config value").unwrap_err();
        assert_eq!(failure.actual.as_deref(), Some("Some(\"old\")"));
        assert_eq!(failure.expected.as_deref(), Some("Some(\"new\")"));
        assert_eq!(
            failure.to_string(),
            "config value (expected Some(\"new\"), actual Some(\"old\"))"
        );
    }

    #[test]
    fn not_null_yields_the_value() {
        assert_eq!(assert_not_null(Some(7), "present").unwrap(), 7);
        let failure = assert_not_null::<u8>(None, "platform").unwrap_err();
        assert_eq!(failure.to_string(), "platform");
    }

    #[test]
    fn failure_is_a_std_error() {
        let failure: Box<dyn std::error::Error> =
            Box::new(assert_true(false, "session is active").unwrap_err());
        assert_eq!(failure.to_string(), "session is active");
        assert!(failure.source().is_none());
    }

    #[test]
    fn number_equality_ignores_primitive_type() {
        assert!(assert_number_equals(10usize, 10, "count").is_ok());
        assert!(assert_number_equals(3.0, 3u8, "integral float").is_ok());
        assert!(assert_number_equals(2.5, 2, "fraction").is_err());
        assert!(assert_number_equals(-1i64, u64::MAX, "no wrap").is_err());
        let failure = assert_number_equals(9usize, 10, "services").unwrap_err();
        assert_eq!(failure.actual.as_deref(), Some("9"));
        assert_eq!(failure.expected.as_deref(), Some("10"));
    }

    #[test]
    fn assert_true_keeps_message() {
        assert!(assert_true(true, "fine").is_ok());
        assert_eq!(
            assert_true(false, "no events found").unwrap_err().message,
            "no events found"
        );
    }
}
