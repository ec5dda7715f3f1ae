// Value <-> text helpers shared by every operation group.
//
// `serialize` renders path and query values: scalars in their invariant
// textual form, anything else as compact JSON. Values whose JSON form is a
// plain string (strings, GUIDs, unit enum variants) come back bare, without
// the surrounding quotes. Non-finite floats, which JSON cannot carry,
// render as `NaN`, `Infinity` and `-Infinity`.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::ser::{self, Impossible, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::error::{MaestroError, Result};

pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    if let Ok(text) = value.serialize(NonFiniteFloat) {
        return Ok(text);
    }
    match serde_json::to_value(value).map_err(MaestroError::Serialize)? {
        Value::String(text) => Ok(text),
        Value::Bool(flag) => Ok(if flag { "true" } else { "false" }.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => serde_json::to_string(&other).map_err(MaestroError::Serialize),
    }
}

/// Parse `content` into `T`. A `String` target gets the content verbatim.
pub fn deserialize<T: DeserializeOwned + 'static>(content: &str) -> Result<T> {
    let verbatim: Box<dyn Any> = Box::new(content.to_owned());
    match verbatim.downcast::<T>() {
        Ok(text) => Ok(*text),
        Err(_) => serde_json::from_str(content).map_err(MaestroError::Deserialize),
    }
}

// Renders a non-finite float; everything else is declined so the JSON path
// handles it.
struct NonFiniteFloat;

#[derive(Debug)]
struct Declined;

impl fmt::Display for Declined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not a non-finite float")
    }
}

impl std::error::Error for Declined {}

impl ser::Error for Declined {
    fn custom<M: fmt::Display>(_msg: M) -> Self {
        Declined
    }
}

type Declines = Impossible<String, Declined>;

macro_rules! decline {
    ($($method:ident($($arg:ty),*) -> $ok:ty;)*) => {
        $(
            fn $method(self, $(_: $arg),*) -> std::result::Result<$ok, Declined> {
                Err(Declined)
            }
        )*
    };
}

impl Serializer for NonFiniteFloat {
    type Ok = String;
    type Error = Declined;
    type SerializeSeq = Declines;
    type SerializeTuple = Declines;
    type SerializeTupleStruct = Declines;
    type SerializeTupleVariant = Declines;
    type SerializeMap = Declines;
    type SerializeStruct = Declines;
    type SerializeStructVariant = Declines;

    fn serialize_f64(self, v: f64) -> std::result::Result<String, Declined> {
        if v.is_nan() {
            Ok("NaN".to_string())
        } else if v.is_infinite() {
            Ok(if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string())
        } else {
            Err(Declined)
        }
    }

    fn serialize_f32(self, v: f32) -> std::result::Result<String, Declined> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_some<T>(self, value: &T) -> std::result::Result<String, Declined>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T>(
        self,
        _name: &'static str,
        value: &T,
    ) -> std::result::Result<String, Declined>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> std::result::Result<String, Declined>
    where
        T: ?Sized + Serialize,
    {
        Err(Declined)
    }

    decline! {
        serialize_bool(bool) -> String;
        serialize_i8(i8) -> String;
        serialize_i16(i16) -> String;
        serialize_i32(i32) -> String;
        serialize_i64(i64) -> String;
        serialize_u8(u8) -> String;
        serialize_u16(u16) -> String;
        serialize_u32(u32) -> String;
        serialize_u64(u64) -> String;
        serialize_char(char) -> String;
        serialize_str(&str) -> String;
        serialize_bytes(&[u8]) -> String;
        serialize_none() -> String;
        serialize_unit() -> String;
        serialize_unit_struct(&'static str) -> String;
        serialize_unit_variant(&'static str, u32, &'static str) -> String;
        serialize_seq(Option<usize>) -> Declines;
        serialize_tuple(usize) -> Declines;
        serialize_tuple_struct(&'static str, usize) -> Declines;
        serialize_tuple_variant(&'static str, u32, &'static str, usize) -> Declines;
        serialize_map(Option<usize>) -> Declines;
        serialize_struct(&'static str, usize) -> Declines;
        serialize_struct_variant(&'static str, u32, &'static str, usize) -> Declines;
    }
}
