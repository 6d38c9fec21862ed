//! The `a{sv}` row reply and the writers that build it.
//!
//! A reply is assembled through nested containers, mirroring the D-Bus
//! message layout:
//!
//! ```text
//! RowBuilder          a{sv}   the row
//!  └─ EntryWriter     {sv}    one field, keyed by column name
//!      └─ VariantWriter  v    the typed value
//! ```
//!
//! Each writer borrows its parent mutably and is consumed when closed, so
//! an entry can only be opened inside the row, a variant only inside an
//! entry, and nothing reaches the row until the variant receives its value.
//! A writer that is dropped early leaves the row untouched.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use zbus::zvariant::{Signature, Type, Value};

use crate::error::EncodeError;
use crate::types::WireSignature;

/// A column value in its wire-native form.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
}

impl WireValue {
    pub fn signature(&self) -> WireSignature {
        match self {
            Self::Boolean(_) => WireSignature::Boolean,
            Self::Int16(_) => WireSignature::Int16,
            Self::Int32(_) => WireSignature::Int32,
            Self::Int64(_) => WireSignature::Int64,
            Self::Double(_) => WireSignature::Double,
            Self::String(_) => WireSignature::String,
        }
    }

    /// Borrow as a D-Bus variant.
    pub fn to_variant(&self) -> Value<'_> {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Int16(n) => Value::I16(*n),
            Self::Int32(n) => Value::I32(*n),
            Self::Int64(n) => Value::I64(*n),
            Self::Double(d) => Value::F64(*d),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

/// One `{sv}` entry of a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEntry {
    pub name: String,
    pub value: WireValue,
}

/// A single result row, fields in the order the database returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowReply {
    entries: Vec<RowEntry>,
}

impl RowReply {
    /// The reply sent when the database could not be reached or returned nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[RowEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }
}

impl Serialize for RowReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.value.to_variant())?;
        }
        map.end()
    }
}

impl Type for RowReply {
    fn signature() -> Signature<'static> {
        <HashMap<String, Value<'static>> as Type>::signature()
    }
}

/// The open `a{sv}` container.
#[derive(Debug, Default)]
pub struct RowBuilder {
    entries: Vec<RowEntry>,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(fields: usize) -> Self {
        Self {
            entries: Vec::with_capacity(fields),
        }
    }

    /// Open a `{sv}` dict entry keyed by `name`.
    pub fn open_entry(&mut self, name: impl Into<String>) -> EntryWriter<'_> {
        EntryWriter {
            row: self,
            name: name.into(),
        }
    }

    /// Close the row.
    pub fn finish(self) -> RowReply {
        RowReply {
            entries: self.entries,
        }
    }
}

/// An open `{sv}` dict entry whose key is already written.
#[derive(Debug)]
pub struct EntryWriter<'r> {
    row: &'r mut RowBuilder,
    name: String,
}

impl<'r> EntryWriter<'r> {
    /// Open the variant holding this field's value.
    pub fn open_variant(self, signature: WireSignature) -> VariantWriter<'r> {
        VariantWriter {
            row: self.row,
            name: self.name,
            signature,
        }
    }
}

/// An open `v` container with a fixed signature.
#[derive(Debug)]
pub struct VariantWriter<'r> {
    row: &'r mut RowBuilder,
    name: String,
    signature: WireSignature,
}

impl VariantWriter<'_> {
    pub fn signature(&self) -> WireSignature {
        self.signature
    }

    /// Write the value and close both the variant and its dict entry.
    pub fn append(self, value: WireValue) -> Result<(), EncodeError> {
        if value.signature() != self.signature {
            return Err(EncodeError::SignatureMismatch {
                expected: self.signature,
                found: value.signature(),
            });
        }
        self.row.entries.push(RowEntry {
            name: self.name,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_keeps_field_order() {
        let mut row = RowBuilder::new();
        for (name, n) in [("zeta", 1), ("alpha", 2), ("mid", 3)] {
            row.open_entry(name)
                .open_variant(WireSignature::Int32)
                .append(WireValue::Int32(n))
                .unwrap();
        }
        let reply = row.finish();

        let names: Vec<&str> = reply.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(reply.get("alpha"), Some(&WireValue::Int32(2)));
    }

    #[test]
    fn test_mismatched_value_is_not_written() {
        let mut row = RowBuilder::new();
        let err = row
            .open_entry("flag")
            .open_variant(WireSignature::Boolean)
            .append(WireValue::String("t".to_string()))
            .unwrap_err();

        assert_eq!(
            err,
            EncodeError::SignatureMismatch {
                expected: WireSignature::Boolean,
                found: WireSignature::String,
            }
        );
        assert!(row.finish().is_empty());
    }

    #[test]
    fn test_abandoned_entry_leaves_row_untouched() {
        let mut row = RowBuilder::new();
        let _ = row.open_entry("half").open_variant(WireSignature::Int16);
        assert!(row.finish().is_empty());
    }

    #[test]
    fn test_reply_signature_is_dict_of_variants() {
        assert_eq!(RowReply::signature().as_str(), "a{sv}");
    }

    #[test]
    fn test_to_variant() {
        assert_eq!(WireValue::Boolean(true).to_variant(), Value::Bool(true));
        assert_eq!(WireValue::Int64(-7).to_variant(), Value::I64(-7));
        assert_eq!(
            WireValue::String("pg".to_string()).to_variant(),
            Value::from("pg")
        );
    }
}
