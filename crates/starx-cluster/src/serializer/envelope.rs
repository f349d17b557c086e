//! Self-describing argument envelopes for RPC calls.
//!
//! An argument list is a `Vec<Arg>`. Every element carries its own type tag,
//! and the whole list is encoded as a single JSON array:
//!
//! ```text
//! [{"t":"int","v":42},{"t":"str","v":"lobby"},{"t":"struct","v":{"x":1}}]
//! ```
//!
//! Decoding a list into a tuple reproduces the encoded values in order. JSON
//! has no encoding for NaN or infinities, so non-finite floats are rejected
//! when encoding instead of turning into `null`.

use crate::error::{Result, StarxError};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::ser::{self, Impossible};
use serde::{Deserialize, Serialize};

/// A single tagged RPC argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    #[serde(rename = "uint")]
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    Struct(serde_json::Value),
}

impl Arg {
    /// Encode any serializable value, choosing the narrowest tag.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        // Floats and byte strings lose their kind inside `serde_json::Value`.
        match value.serialize(ScalarKind) {
            Ok(Scalar::Float(f)) => {
                check_finite(f)?;
                return Ok(Arg::Float(f));
            }
            Ok(Scalar::Bytes(b)) => return Ok(Arg::Bytes(b)),
            _ => {}
        }

        let value = serde_json::to_value(value).map_err(|e| StarxError::Serialization {
            serializer: "rpc-args".to_string(),
            message: e.to_string(),
            source: Some(e),
        })?;

        Ok(match value {
            serde_json::Value::Null => Arg::Null,
            serde_json::Value::Bool(b) => Arg::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Arg::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Arg::UInt(u)
                } else {
                    Arg::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Arg::Str(s),
            other => Arg::Struct(other),
        })
    }

    /// Decode this argument into a typed target.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value()).map_err(|e| StarxError::decode("rpc argument", e))
    }

    fn to_value(&self) -> serde_json::Value {
        match self {
            Arg::Null => serde_json::Value::Null,
            Arg::Bool(b) => serde_json::Value::Bool(*b),
            Arg::Int(i) => serde_json::Value::from(*i),
            Arg::UInt(u) => serde_json::Value::from(*u),
            Arg::Float(f) => serde_json::Value::from(*f),
            Arg::Str(s) => serde_json::Value::String(s.clone()),
            Arg::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Arg::Struct(v) => v.clone(),
        }
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Arg::Int(i),
            Err(_) => Arg::UInt(value),
        }
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

fn check_finite(value: f64) -> Result<()> {
    if value.is_finite() {
        return Ok(());
    }
    Err(StarxError::Serialization {
        serializer: "rpc-args".to_string(),
        message: format!("non-finite float {} has no JSON encoding", value),
        source: None,
    })
}

type ScalarResult<T> = std::result::Result<T, serde_json::Error>;

enum Scalar {
    Float(f64),
    Bytes(Bytes),
    Other,
}

/// Serializer that only reports whether a value is a float or a byte string.
/// Compound values end in an error, which callers read as `Other`.
struct ScalarKind;

macro_rules! other_scalar {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, _value: $ty) -> ScalarResult<Scalar> {
                Ok(Scalar::Other)
            }
        )*
    };
}

fn compound() -> serde_json::Error {
    ser::Error::custom("compound value")
}

impl ser::Serializer for ScalarKind {
    type Ok = Scalar;
    type Error = serde_json::Error;
    type SerializeSeq = Impossible<Scalar, serde_json::Error>;
    type SerializeTuple = Impossible<Scalar, serde_json::Error>;
    type SerializeTupleStruct = Impossible<Scalar, serde_json::Error>;
    type SerializeTupleVariant = Impossible<Scalar, serde_json::Error>;
    type SerializeMap = Impossible<Scalar, serde_json::Error>;
    type SerializeStruct = Impossible<Scalar, serde_json::Error>;
    type SerializeStructVariant = Impossible<Scalar, serde_json::Error>;

    other_scalar!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_char(char),
        serialize_str(&str),
        serialize_unit_struct(&'static str),
    );

    fn serialize_f32(self, value: f32) -> ScalarResult<Scalar> {
        Ok(Scalar::Float(value.into()))
    }

    fn serialize_f64(self, value: f64) -> ScalarResult<Scalar> {
        Ok(Scalar::Float(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> ScalarResult<Scalar> {
        Ok(Scalar::Bytes(Bytes::copy_from_slice(value)))
    }

    fn serialize_none(self) -> ScalarResult<Scalar> {
        Ok(Scalar::Other)
    }

    fn serialize_some<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> ScalarResult<Scalar> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> ScalarResult<Scalar> {
        Ok(Scalar::Other)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> ScalarResult<Scalar> {
        Ok(Scalar::Other)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> ScalarResult<Scalar> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> ScalarResult<Scalar> {
        Err(compound())
    }

    fn serialize_seq(self, _len: Option<usize>) -> ScalarResult<Self::SerializeSeq> {
        Err(compound())
    }

    fn serialize_tuple(self, _len: usize) -> ScalarResult<Self::SerializeTuple> {
        Err(compound())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> ScalarResult<Self::SerializeTupleStruct> {
        Err(compound())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> ScalarResult<Self::SerializeTupleVariant> {
        Err(compound())
    }

    fn serialize_map(self, _len: Option<usize>) -> ScalarResult<Self::SerializeMap> {
        Err(compound())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> ScalarResult<Self::SerializeStruct> {
        Err(compound())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> ScalarResult<Self::SerializeStructVariant> {
        Err(compound())
    }
}

/// Build a `Result<Vec<Arg>>` from heterogeneous serializable values.
///
/// Each value gets its narrowest tag, `bytes::Bytes` included.
///
/// ```
/// use starx_cluster::rpc_args;
///
/// let args = rpc_args![42, "lobby", vec![1, 2, 3]].unwrap();
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! rpc_args {
    () => {
        $crate::Result::<::std::vec::Vec<$crate::serializer::Arg>>::Ok(::std::vec::Vec::new())
    };
    ($($arg:expr),+ $(,)?) => {
        (|| -> $crate::Result<::std::vec::Vec<$crate::serializer::Arg>> {
            Ok(::std::vec![$($crate::serializer::Arg::encode(&$arg)?),+])
        })()
    };
}

/// Encode an argument list as one envelope.
///
/// Fails with `Serialization` if any argument is a non-finite float.
pub fn encode_args(args: &[Arg]) -> Result<Bytes> {
    for arg in args {
        if let Arg::Float(f) = arg {
            check_finite(*f)?;
        }
    }
    serde_json::to_vec(args)
        .map(Bytes::from)
        .map_err(|e| StarxError::Serialization {
            serializer: "rpc-args".to_string(),
            message: e.to_string(),
            source: Some(e),
        })
}

/// Decode an envelope back into its tagged arguments.
pub fn decode_args(data: &[u8]) -> Result<Vec<Arg>> {
    serde_json::from_slice(data).map_err(|e| StarxError::decode("rpc argument envelope", e))
}

/// Decode an envelope into typed targets, usually a tuple with one element
/// per argument. An empty envelope also decodes into `()`.
pub fn decode_args_into<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let args = decode_args(data)?;
    if args.is_empty() {
        if let Ok(unit) = serde_json::from_value(serde_json::Value::Null) {
            return Ok(unit);
        }
    }

    let values = args.iter().map(Arg::to_value).collect();
    serde_json::from_value(serde_json::Value::Array(values))
        .map_err(|e| StarxError::decode("rpc argument envelope", e))
}

/// Decode an RPC reply payload into a typed target.
pub fn decode_reply<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| StarxError::decode("rpc reply", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Position {
        x: i32,
        y: i32,
        zone: String,
    }

    #[test]
    fn test_encode_chooses_tags() {
        assert_eq!(Arg::encode(&()).unwrap(), Arg::Null);
        assert_eq!(Arg::encode(&true).unwrap(), Arg::Bool(true));
        assert_eq!(Arg::encode(&-3i32).unwrap(), Arg::Int(-3));
        assert_eq!(Arg::encode(&u64::MAX).unwrap(), Arg::UInt(u64::MAX));
        assert_eq!(Arg::encode(&1.5f64).unwrap(), Arg::Float(1.5));
        assert_eq!(Arg::encode("hi").unwrap(), Arg::Str("hi".into()));
        assert!(matches!(Arg::encode(&vec![1, 2]).unwrap(), Arg::Struct(_)));
    }

    #[test]
    fn test_encode_tags_bytes_as_bytes() {
        let raw = Bytes::from_static(b"\x00\x01");
        assert_eq!(Arg::encode(&raw).unwrap(), Arg::Bytes(raw.clone()));
        assert_eq!(rpc_args![raw.clone(), 2.0f32].unwrap(), vec![Arg::Bytes(raw), Arg::Float(2.0)]);
        // A plain Vec<u8> is a sequence, not a byte string.
        assert!(matches!(Arg::encode(&vec![0u8, 1]).unwrap(), Arg::Struct(_)));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Arg::encode(&value),
                Err(StarxError::Serialization { .. })
            ));
            assert!(matches!(
                encode_args(&[Arg::Float(value), Arg::Int(1)]),
                Err(StarxError::Serialization { .. })
            ));
        }
        assert!(rpc_args![1, f32::NAN].is_err());

        let encoded = encode_args(&[Arg::Float(-0.5), Arg::Float(f64::MAX)]).unwrap();
        assert_eq!(
            decode_args(&encoded).unwrap(),
            vec![Arg::Float(-0.5), Arg::Float(f64::MAX)]
        );
    }

    #[test]
    fn test_empty_list_roundtrip() {
        let encoded = encode_args(&[]).unwrap();
        assert!(decode_args(&encoded).unwrap().is_empty());

        let () = decode_args_into(&encoded).unwrap();
        let values: Vec<i32> = decode_args_into(&encoded).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_single_arg_roundtrip() {
        let encoded = encode_args(&rpc_args![1001u64].unwrap()).unwrap();
        let (uid,): (u64,) = decode_args_into(&encoded).unwrap();
        assert_eq!(uid, 1001);
    }

    #[test]
    fn test_mixed_args_roundtrip() {
        let pos = Position {
            x: 4,
            y: -9,
            zone: "harbor".into(),
        };
        let args = rpc_args![7i64, "join", pos.clone(), false, 0.25f64, u64::MAX].unwrap();
        let encoded = encode_args(&args).unwrap();

        assert_eq!(decode_args(&encoded).unwrap(), args);

        let decoded: (i64, String, Position, bool, f64, u64) = decode_args_into(&encoded).unwrap();
        assert_eq!(decoded, (7, "join".to_string(), pos, false, 0.25, u64::MAX));
    }

    #[test]
    fn test_bytes_arg_roundtrip() {
        let args = vec![Arg::from(Bytes::from_static(b"\x00\xffraw"))];
        let encoded = encode_args(&args).unwrap();

        let decoded = decode_args(&encoded).unwrap();
        assert_eq!(decoded, args);
        let (raw,): (Vec<u8>,) = decode_args_into(&encoded).unwrap();
        assert_eq!(raw, b"\x00\xffraw");
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let encoded = encode_args(&rpc_args!["not a number"].unwrap()).unwrap();
        let result: Result<(i64,)> = decode_args_into(&encoded);
        assert!(matches!(result, Err(StarxError::Decode { .. })));
    }

    #[test]
    fn test_arity_mismatch_is_decode_error() {
        let encoded = encode_args(&rpc_args![1, 2, 3].unwrap()).unwrap();
        let result: Result<(i64, i64)> = decode_args_into(&encoded);
        assert!(matches!(result, Err(StarxError::Decode { .. })));
    }

    #[test]
    fn test_malformed_envelope_is_decode_error() {
        assert!(matches!(
            decode_args(b"{not json"),
            Err(StarxError::Decode { .. })
        ));
        assert!(matches!(
            decode_args(br#"[{"t":"mystery","v":1}]"#),
            Err(StarxError::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_reply() {
        let pos: Position = decode_reply(br#"{"x":1,"y":2,"zone":"docks"}"#).unwrap();
        assert_eq!(pos.zone, "docks");

        let bad: Result<Position> = decode_reply(br#"{"x":"one"}"#);
        assert!(matches!(bad, Err(StarxError::Decode { .. })));
    }

    #[test]
    fn test_single_arg_decode() {
        let arg = Arg::encode(&Position {
            x: 0,
            y: 0,
            zone: "spawn".into(),
        })
        .unwrap();
        let pos: Position = arg.decode().unwrap();
        assert_eq!(pos.zone, "spawn");
        assert!(arg.decode::<bool>().is_err());
    }
}
