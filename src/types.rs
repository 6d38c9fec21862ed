//! PostgreSQL type OIDs and their D-Bus wire signatures.
//!
//! Reference: https://github.com/postgres/postgres/blob/master/src/include/catalog/pg_type.dat

use std::fmt;

/// A PostgreSQL type identifier.
pub type Oid = u32;

/// PostgreSQL Type OIDs
pub mod oid {
    use super::Oid;

    // Boolean
    pub const BOOL: Oid = 16;

    // Characters
    pub const NAME: Oid = 19;

    // Integers
    pub const INT8: Oid = 20; // bigint
    pub const INT2: Oid = 21; // smallint
    pub const INT4: Oid = 23; // integer

    // Text
    pub const TEXT: Oid = 25;
    pub const VARCHAR: Oid = 1043;
    pub const BPCHAR: Oid = 1042; // blank-padded char

    // OID
    pub const OID: Oid = 26;

    // Documents
    pub const JSON: Oid = 114;
    pub const XML: Oid = 142;

    // Float
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;

    // Types that fall back to the string signature but have no encoder
    pub const NUMERIC: Oid = 1700;
    pub const DATE: Oid = 1082;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const UUID: Oid = 2950;
    pub const JSONB: Oid = 3802;
}

/// The single-character D-Bus type a column value is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireSignature {
    Boolean,
    Int16,
    Int32,
    Int64,
    Double,
    String,
}

impl WireSignature {
    /// The D-Bus type code.
    pub fn as_char(self) -> char {
        match self {
            Self::Boolean => 'b',
            Self::Int16 => 'n',
            Self::Int32 => 'i',
            Self::Int64 => 'x',
            Self::Double => 'd',
            Self::String => 's',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::String => "string",
        }
    }
}

impl fmt::Display for WireSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a column type to the signature its value travels as.
///
/// Total: anything not listed goes out as a string.
pub fn signature_for(type_oid: Oid) -> WireSignature {
    match type_oid {
        oid::BOOL => WireSignature::Boolean,
        oid::INT2 => WireSignature::Int16,
        oid::INT4 | oid::OID => WireSignature::Int32,
        oid::INT8 => WireSignature::Int64,
        oid::FLOAT4 | oid::FLOAT8 => WireSignature::Double,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::XML | oid::JSON => {
            WireSignature::String
        }
        _ => WireSignature::String,
    }
}

/// Check if an OID is one of the text-like types the encoder passes through.
pub fn is_text_oid(type_oid: Oid) -> bool {
    matches!(
        type_oid,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::XML | oid::JSON
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_for_known_types() {
        assert_eq!(signature_for(oid::BOOL), WireSignature::Boolean);
        assert_eq!(signature_for(oid::INT2), WireSignature::Int16);
        assert_eq!(signature_for(oid::INT4), WireSignature::Int32);
        assert_eq!(signature_for(oid::OID), WireSignature::Int32);
        assert_eq!(signature_for(oid::INT8), WireSignature::Int64);
        assert_eq!(signature_for(oid::FLOAT4), WireSignature::Double);
        assert_eq!(signature_for(oid::FLOAT8), WireSignature::Double);
        for text in [oid::TEXT, oid::VARCHAR, oid::BPCHAR, oid::NAME, oid::XML, oid::JSON] {
            assert_eq!(signature_for(text), WireSignature::String);
        }
    }

    #[test]
    fn test_signature_for_unknown_falls_back_to_string() {
        for other in [0, oid::NUMERIC, oid::UUID, oid::JSONB, 99_999, Oid::MAX] {
            assert_eq!(signature_for(other), WireSignature::String);
        }
    }

    #[test]
    fn test_signature_for_is_deterministic() {
        for type_oid in 0..4000 {
            assert_eq!(signature_for(type_oid), signature_for(type_oid));
        }
    }

    #[test]
    fn test_wire_chars() {
        let chars: String = [
            WireSignature::Boolean,
            WireSignature::Int16,
            WireSignature::Int32,
            WireSignature::Int64,
            WireSignature::Double,
            WireSignature::String,
        ]
        .iter()
        .map(|s| s.as_char())
        .collect();
        assert_eq!(chars, "bnixds");
    }
}
