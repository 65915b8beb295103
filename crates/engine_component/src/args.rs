//! Positional arguments passed to component constructors and event handlers.
//!
//! Arguments are dynamically typed [`serde_json::Value`]s so that one call
//! shape serves every component. Constructors pull typed values back out
//! through the accessors on [`Args`], which fail with an [`ArgError`] when an
//! argument is missing or has the wrong shape.

use serde_json::Value;

/// An ordered list of positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

/// Errors raised by the typed accessors on [`Args`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ArgError {
    /// No argument at this position.
    #[error("missing argument at position {0}")]
    Missing(usize),

    /// The argument exists but is not of the requested type.
    #[error("argument at position {index} is not a {expected}")]
    Type {
        /// Position of the offending argument.
        index: usize,
        /// Human-readable name of the requested type.
        expected: &'static str,
    },
}

impl Args {
    /// An empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an argument.
    #[must_use]
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.0.push(value.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw access to the argument at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    /// The argument at `index` as a number.
    ///
    /// # Errors
    ///
    /// [`ArgError::Missing`] or [`ArgError::Type`].
    pub fn f64(&self, index: usize) -> Result<f64, ArgError> {
        let value = self.get(index).ok_or(ArgError::Missing(index))?;
        value.as_f64().ok_or(ArgError::Type {
            index,
            expected: "number",
        })
    }

    /// The argument at `index` as an `f32`. Precision is truncated.
    ///
    /// # Errors
    ///
    /// [`ArgError::Missing`] or [`ArgError::Type`].
    pub fn f32(&self, index: usize) -> Result<f32, ArgError> {
        self.f64(index).map(|v| v as f32)
    }

    /// The argument at `index` as a number, or `default` when absent or `null`.
    ///
    /// # Errors
    ///
    /// [`ArgError::Type`] when the argument is present but not a number.
    pub fn f64_or(&self, index: usize, default: f64) -> Result<f64, ArgError> {
        match self.get(index) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.f64(index),
        }
    }

    /// `f32` counterpart of [`Args::f64_or`].
    ///
    /// # Errors
    ///
    /// [`ArgError::Type`] when the argument is present but not a number.
    pub fn f32_or(&self, index: usize, default: f32) -> Result<f32, ArgError> {
        self.f64_or(index, f64::from(default)).map(|v| v as f32)
    }

    /// The argument at `index` as a signed integer.
    ///
    /// # Errors
    ///
    /// [`ArgError::Missing`] or [`ArgError::Type`].
    pub fn i64(&self, index: usize) -> Result<i64, ArgError> {
        let value = self.get(index).ok_or(ArgError::Missing(index))?;
        value.as_i64().ok_or(ArgError::Type {
            index,
            expected: "integer",
        })
    }

    /// The argument at `index` as a string slice.
    ///
    /// # Errors
    ///
    /// [`ArgError::Missing`] or [`ArgError::Type`].
    pub fn str(&self, index: usize) -> Result<&str, ArgError> {
        let value = self.get(index).ok_or(ArgError::Missing(index))?;
        value.as_str().ok_or(ArgError::Type {
            index,
            expected: "string",
        })
    }

    /// The argument at `index` as a boolean.
    ///
    /// # Errors
    ///
    /// [`ArgError::Missing`] or [`ArgError::Type`].
    pub fn bool(&self, index: usize) -> Result<bool, ArgError> {
        let value = self.get(index).ok_or(ArgError::Missing(index))?;
        value.as_bool().ok_or(ArgError::Type {
            index,
            expected: "boolean",
        })
    }

    /// Consume the list, returning the first argument or `null`.
    #[must_use]
    pub fn into_first(self) -> Value {
        self.0.into_iter().next().unwrap_or(Value::Null)
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build an [`Args`] list from expressions convertible into
/// [`serde_json::Value`].
///
/// ```rust
/// use engine_component::args;
///
/// let a = args![5.0, 5.0];
/// assert_eq!(a.f64(1).unwrap(), 5.0);
/// assert!(args![].is_empty());
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::from(vec![$($crate::Value::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_accessors() {
        let a = args![5, 2.5];
        assert_eq!(a.f64(0), Ok(5.0));
        assert_eq!(a.f32(1), Ok(2.5));
        assert_eq!(a.i64(0), Ok(5));
    }

    #[test]
    fn test_missing_and_mistyped() {
        let a = args!["hero.png"];
        assert_eq!(a.f64(1), Err(ArgError::Missing(1)));
        assert_eq!(
            a.f64(0),
            Err(ArgError::Type {
                index: 0,
                expected: "number"
            })
        );
        assert_eq!(a.str(0), Ok("hero.png"));
    }

    #[test]
    fn test_defaults_apply_to_absent_and_null() {
        let a = Args::new().with(Value::Null);
        assert_eq!(a.f64_or(0, 3.0), Ok(3.0));
        assert_eq!(a.f32_or(4, 1.5), Ok(1.5));
        assert!(args!["x"].f64_or(0, 0.0).is_err());
    }

    #[test]
    fn test_into_first() {
        assert_eq!(args![].into_first(), Value::Null);
        assert_eq!(args![true, 1].into_first(), Value::Bool(true));
    }
}
