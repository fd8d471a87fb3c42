///
/// One-way wrapper for sensitive text.
///
/// A `VaultedString` can be constructed from clear text and forwarded
/// back into a native argument, but nothing on this type hands the
/// payload back to host code. Formatting always prints the fixed
/// redacted form. Absence is `Option<VaultedString>`, never an empty
/// wrapper.
///

use std::fmt;

use crate::value::{IntoNative, Value};

/// The form every `Display` and `Debug` of a vaulted value takes.
pub const REDACTED: &str = "[vaulted]";

pub struct VaultedString {
    text: String,
}

impl VaultedString {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for VaultedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Debug for VaultedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Opaque forwarding: the payload moves into a native argument without
/// ever being observable on the host side.
impl IntoNative for VaultedString {
    fn into_native(self) -> Value {
        Value::Text(self.text)
    }
}

impl IntoNative for &VaultedString {
    fn into_native(self) -> Value {
        Value::Text(self.text.clone())
    }
}
