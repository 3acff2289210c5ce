//! Synchronous matchers with the usual test-framework semantics.

use crate::Expectation;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{Debug, Display};
use vouch_core::errors::{EvalError, Result};

/// Loose truthiness: false, zero, NaN, empty strings, `None` and JSON null are falsy.
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

macro_rules! int_truthy {
    ($($t:ty),*) => {
        $(impl Truthy for $t {
            fn is_truthy(&self) -> bool {
                *self != 0
            }
        })*
    };
}

int_truthy!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Truthy for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().map_or(false, Truthy::is_truthy)
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map_or(true, |f| f.is_truthy()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

/// Membership: substrings for text, elements for sequences.
pub trait Contains<U: ?Sized> {
    fn contains_item(&self, item: &U) -> bool;
}

impl Contains<str> for str {
    fn contains_item(&self, item: &str) -> bool {
        self.contains(item)
    }
}

impl Contains<str> for String {
    fn contains_item(&self, item: &str) -> bool {
        self.contains(item)
    }
}

impl<U: PartialEq> Contains<U> for [U] {
    fn contains_item(&self, item: &U) -> bool {
        self.contains(item)
    }
}

impl<U: PartialEq> Contains<U> for Vec<U> {
    fn contains_item(&self, item: &U) -> bool {
        self.as_slice().contains(item)
    }
}

impl Contains<str> for Vec<String> {
    fn contains_item(&self, item: &str) -> bool {
        self.iter().any(|s| s == item)
    }
}

impl Contains<str> for [String] {
    fn contains_item(&self, item: &str) -> bool {
        self.iter().any(|s| s == item)
    }
}

impl<U: ?Sized, C: Contains<U> + ?Sized> Contains<U> for &C {
    fn contains_item(&self, item: &U) -> bool {
        (**self).contains_item(item)
    }
}

impl<'a, T: Debug> Expectation<'a, T> {
    pub fn to_be<U: Debug>(&self, expected: U) -> Result<()>
    where
        T: PartialEq<U>,
    {
        let passed = self.actual == expected;
        self.simple_verdict("to_be", passed, |not| {
            format!("expected {:?} {}to be {:?}", self.actual, not, expected)
        })
    }

    /// Deep equality of the serialized forms; object key order is ignored.
    pub fn to_equal<U: Serialize + Debug>(&self, expected: &U) -> Result<()>
    where
        T: Serialize,
    {
        let actual = to_json("to_equal", &self.actual)?;
        let wanted = to_json("to_equal", expected)?;
        let passed = actual == wanted;
        self.simple_verdict("to_equal", passed, |not| {
            format!("expected {} {}to equal {}", actual, not, wanted)
        })
    }

    pub fn to_be_truthy(&self) -> Result<()>
    where
        T: Truthy,
    {
        let passed = self.actual.is_truthy();
        self.simple_verdict("to_be_truthy", passed, |not| {
            format!("expected {:?} {}to be truthy", self.actual, not)
        })
    }

    pub fn to_be_falsy(&self) -> Result<()>
    where
        T: Truthy,
    {
        let passed = !self.actual.is_truthy();
        self.simple_verdict("to_be_falsy", passed, |not| {
            format!("expected {:?} {}to be falsy", self.actual, not)
        })
    }

    pub fn to_contain<U: Debug + ?Sized>(&self, item: &U) -> Result<()>
    where
        T: Contains<U>,
    {
        let passed = self.actual.contains_item(item);
        self.simple_verdict("to_contain", passed, |not| {
            format!("expected {:?} {}to contain {:?}", self.actual, not, item)
        })
    }

    /// An invalid pattern is a configuration error, not a verdict.
    pub fn to_match(&self, pattern: &str) -> Result<()>
    where
        T: AsRef<str>,
    {
        let re = Regex::new(pattern).map_err(|e| {
            EvalError::config(format!("invalid regex pattern '{}': {}", pattern, e))
        })?;
        let passed = re.is_match(self.actual.as_ref());
        self.simple_verdict("to_match", passed, |not| {
            format!("expected {:?} {}to match /{}/", self.actual.as_ref(), not, pattern)
        })
    }

    pub fn to_be_greater_than<U: Debug>(&self, other: U) -> Result<()>
    where
        T: PartialOrd<U>,
    {
        let passed = self.actual > other;
        self.simple_verdict("to_be_greater_than", passed, |not| {
            format!("expected {:?} {}to be greater than {:?}", self.actual, not, other)
        })
    }

    pub fn to_be_less_than<U: Debug>(&self, other: U) -> Result<()>
    where
        T: PartialOrd<U>,
    {
        let passed = self.actual < other;
        self.simple_verdict("to_be_less_than", passed, |not| {
            format!("expected {:?} {}to be less than {:?}", self.actual, not, other)
        })
    }

    /// Passes when `|actual - expected| < 10^-digits / 2`.
    pub fn to_be_close_to(&self, expected: f64, digits: i32) -> Result<()>
    where
        T: Into<f64> + Copy,
    {
        let actual: f64 = self.actual.into();
        let tolerance = 10f64.powi(-digits) / 2.0;
        let diff = (actual - expected).abs();
        let passed = diff < tolerance;
        self.simple_verdict("to_be_close_to", passed, |not| {
            format!(
                "expected {} {}to be close to {} (|diff| = {}, tolerance {})",
                actual, not, expected, diff, tolerance
            )
        })
    }
}

impl<'a, U: Debug> Expectation<'a, Option<U>> {
    pub fn to_be_defined(&self) -> Result<()> {
        let passed = self.actual.is_some();
        self.simple_verdict("to_be_defined", passed, |not| {
            format!("expected {:?} {}to be defined", self.actual, not)
        })
    }

    pub fn to_be_undefined(&self) -> Result<()> {
        let passed = self.actual.is_none();
        self.simple_verdict("to_be_undefined", passed, |not| {
            format!("expected {:?} {}to be undefined", self.actual, not)
        })
    }
}

impl<'a, F, R, E> Expectation<'a, F>
where
    F: FnOnce() -> std::result::Result<R, E>,
    E: Display,
{
    /// Calls the closure; passes when it returns `Err`.
    pub fn to_throw(self) -> Result<()> {
        self.to_throw_containing("")
    }

    /// Like [`to_throw`](Self::to_throw), and the error message must contain `needle`.
    pub fn to_throw_containing(self, needle: &str) -> Result<()> {
        let negated = self.negated;
        let thrown = (self.actual)().err().map(|e| e.to_string());
        let passed = thrown.as_deref().map_or(false, |m| m.contains(needle));
        let message = match (&thrown, negated) {
            (None, _) => "expected function to throw, but it returned Ok".to_string(),
            (Some(m), false) => format!("expected error containing {:?}, got {:?}", needle, m),
            (Some(m), true) => format!("expected function not to throw, but it threw {:?}", m),
        };
        if passed != negated {
            return Ok(());
        }
        Err(EvalError::Assertion {
            matcher: "to_throw",
            message,
            details: json!({ "thrown": thrown, "needle": needle }),
        })
    }
}

fn to_json<S: Serialize + ?Sized>(matcher: &str, v: &S) -> Result<Value> {
    serde_json::to_value(v)
        .map_err(|e| EvalError::config(format!("{}: value is not serializable: {}", matcher, e)))
}
