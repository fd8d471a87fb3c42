///
/// Native value representation and the two codec traits.
///
/// `Value` is the tagged form every argument and out slot takes while
/// crossing the engine boundary. `IntoNative` encodes host values into
/// it, `FromNative` decodes back out. Decoding is strict: a wrong tag is
/// a `TypeMismatch`, never a coercion, and `Null` never stands in for a
/// default. Text crosses as UTF-8 and round-trips byte for byte.
///

use crate::blob::BlobRef;
use crate::error::BridgeError;

/// Column and slot kinds understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int,
    Long,
    Double,
    Text,
    Blob,
    Rows,
}

impl ColumnKind {
    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::Bool => "bool",
            ColumnKind::Int => "int",
            ColumnKind::Long => "long",
            ColumnKind::Double => "double",
            ColumnKind::Text => "text",
            ColumnKind::Blob => "blob",
            ColumnKind::Rows => "rows",
        }
    }
}

/// A value in its boundary form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Blob(BlobRef),
}

impl Value {
    /// The column kind this value inhabits, or `None` for `Null`.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnKind::Bool),
            Value::Int(_) => Some(ColumnKind::Int),
            Value::Long(_) => Some(ColumnKind::Long),
            Value::Double(_) => Some(ColumnKind::Double),
            Value::Text(_) => Some(ColumnKind::Text),
            Value::Blob(_) => Some(ColumnKind::Blob),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Host value to boundary form. Absence encodes as `Value::Null`.
pub trait IntoNative {
    fn into_native(self) -> Value;
}

impl IntoNative for bool {
    fn into_native(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoNative for i32 {
    fn into_native(self) -> Value {
        Value::Int(self)
    }
}

impl IntoNative for i64 {
    fn into_native(self) -> Value {
        Value::Long(self)
    }
}

impl IntoNative for f64 {
    fn into_native(self) -> Value {
        Value::Double(self)
    }
}

impl IntoNative for &str {
    fn into_native(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoNative for String {
    fn into_native(self) -> Value {
        Value::Text(self)
    }
}

impl IntoNative for BlobRef {
    fn into_native(self) -> Value {
        Value::Blob(self)
    }
}

impl<T: IntoNative> IntoNative for Option<T> {
    fn into_native(self) -> Value {
        match self {
            Some(v) => v.into_native(),
            None => Value::Null,
        }
    }
}

/// Boundary form back to a host value. `context` names the slot or cell
/// being decoded so mismatch errors carry their location.
pub trait FromNative: Sized {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError>;
}

impl FromNative for bool {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(BridgeError::mismatch("bool", other.kind_name(), context)),
        }
    }
}

impl FromNative for i32 {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(BridgeError::mismatch("int", other.kind_name(), context)),
        }
    }
}

impl FromNative for i64 {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Long(i) => Ok(*i),
            other => Err(BridgeError::mismatch("long", other.kind_name(), context)),
        }
    }
}

impl FromNative for f64 {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Double(f) => Ok(*f),
            other => Err(BridgeError::mismatch("double", other.kind_name(), context)),
        }
    }
}

impl FromNative for String {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(BridgeError::mismatch("text", other.kind_name(), context)),
        }
    }
}

impl FromNative for BlobRef {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Blob(b) => Ok(*b),
            other => Err(BridgeError::mismatch("blob", other.kind_name(), context)),
        }
    }
}

impl<T: FromNative> FromNative for Option<T> {
    fn from_native(value: &Value, context: &str) -> Result<Self, BridgeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_native(other, context).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_round_trip() {
        let v = true.into_native();
        assert_eq!(bool::from_native(&v, "t").unwrap(), true);

        let v = 41i32.into_native();
        assert_eq!(i32::from_native(&v, "t").unwrap(), 41);

        let v = 9_000_000_000i64.into_native();
        assert_eq!(i64::from_native(&v, "t").unwrap(), 9_000_000_000);

        let v = 2.5f64.into_native();
        assert_eq!(f64::from_native(&v, "t").unwrap(), 2.5);
    }

    #[test]
    fn test_text_round_trips_exactly() {
        let original = "prefix__input with spaces \u{00e9}\u{4e16}";
        let v = original.into_native();
        assert_eq!(String::from_native(&v, "t").unwrap(), original);

        let v = String::new().into_native();
        assert_eq!(String::from_native(&v, "t").unwrap(), "");
    }

    #[test]
    fn test_absent_encodes_as_null_and_back() {
        let v = Option::<i32>::None.into_native();
        assert!(v.is_null());
        assert_eq!(Option::<i32>::from_native(&v, "t").unwrap(), None);

        let v = Some(false).into_native();
        assert_eq!(Option::<bool>::from_native(&v, "t").unwrap(), Some(false));

        let v = Option::<String>::None.into_native();
        assert_eq!(Option::<String>::from_native(&v, "t").unwrap(), None);
    }

    #[test]
    fn test_null_never_aliases_a_value() {
        assert_ne!(Value::Null, Value::Int(0));
        assert_ne!(Value::Null, Value::Bool(false));
        assert_ne!(Value::Null, Value::Text(String::new()));
    }

    #[test]
    fn test_plain_decode_rejects_null() {
        let err = i32::from_native(&Value::Null, "slot 0").unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
        assert!(err.to_string().contains("slot 0"));
    }

    #[test]
    fn test_no_numeric_coercion() {
        let v = Value::Long(7);
        assert!(i32::from_native(&v, "t").is_err());

        let v = Value::Int(7);
        assert!(i64::from_native(&v, "t").is_err());
        assert!(f64::from_native(&v, "t").is_err());
        assert!(bool::from_native(&v, "t").is_err());
    }

    #[test]
    fn test_mismatch_carries_kinds() {
        let err = i64::from_native(&Value::Text("x".into()), "out slot 2").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected long"));
        assert!(msg.contains("found text"));
        assert!(msg.contains("out slot 2"));
    }
}
