//! Type-directed value codec.
//!
//! Every type that crosses the boundary implements [`WireType`]: it knows its
//! own [`TypeDesc`] and how to turn a value into wire text and back. Remote
//! references need the [`Endpoint`] they are encoded for, since encoding a
//! local object registers it and decoding an address builds a stub.

use std::sync::Arc;
use std::time::Duration;

use tws_protocol::{Address, Params, ScalarKind, TwsError, TwsResult, TypeDesc};

use crate::endpoint::Endpoint;
use crate::interface::{Capability, Remotable};
use crate::object::{LocalObject, Outcome};
use crate::proxy::Proxy;

pub trait WireType: Sized + Send + 'static {
    fn describe() -> TypeDesc;

    fn encode(&self, cx: &Endpoint) -> TwsResult<String>;

    fn decode(text: &str, cx: &Endpoint) -> TwsResult<Self>;

    /// Result of an invocation returning this type. Values are encoded in
    /// place; local objects become instances registered by the session.
    fn into_outcome(self, cx: &Endpoint) -> TwsResult<Outcome> {
        self.encode(cx).map(Outcome::Value)
    }
}

/// Description of `T`, for declaring capabilities by hand.
pub fn ty<T: WireType>() -> TypeDesc {
    T::describe()
}

fn malformed(text: &str, expected: &str) -> TwsError {
    TwsError::format(format!("'{text}' is not a valid {expected}"))
}

// ─── Scalars ────────────────────────────────────────────────────────────────

impl WireType for () {
    fn describe() -> TypeDesc {
        TypeDesc::Void
    }

    fn encode(&self, _cx: &Endpoint) -> TwsResult<String> {
        Ok(String::new())
    }

    fn decode(text: &str, _cx: &Endpoint) -> TwsResult<Self> {
        if text.is_empty() {
            Ok(())
        } else {
            Err(malformed(text, "void result"))
        }
    }
}

impl WireType for String {
    fn describe() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::String)
    }

    fn encode(&self, _cx: &Endpoint) -> TwsResult<String> {
        Ok(self.clone())
    }

    fn decode(text: &str, _cx: &Endpoint) -> TwsResult<Self> {
        Ok(text.to_string())
    }
}

impl WireType for bool {
    fn describe() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::Bool)
    }

    fn encode(&self, _cx: &Endpoint) -> TwsResult<String> {
        Ok(self.to_string())
    }

    fn decode(text: &str, _cx: &Endpoint) -> TwsResult<Self> {
        if text.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if text.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(malformed(text, "bool"))
        }
    }
}

macro_rules! numeric_wire_type {
    ($($ty:ty => $kind:ident),+ $(,)?) => {$(
        impl WireType for $ty {
            fn describe() -> TypeDesc {
                TypeDesc::Scalar(ScalarKind::$kind)
            }

            fn encode(&self, _cx: &Endpoint) -> TwsResult<String> {
                Ok(self.to_string())
            }

            fn decode(text: &str, _cx: &Endpoint) -> TwsResult<Self> {
                text.parse::<$ty>().map_err(|_| malformed(text, stringify!($ty)))
            }
        }
    )+};
}

numeric_wire_type!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
);

/// Durations travel as whole milliseconds.
impl WireType for Duration {
    fn describe() -> TypeDesc {
        TypeDesc::Custom {
            name: "duration-ms".into(),
        }
    }

    fn encode(&self, _cx: &Endpoint) -> TwsResult<String> {
        Ok(self.as_millis().to_string())
    }

    fn decode(text: &str, _cx: &Endpoint) -> TwsResult<Self> {
        text.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| malformed(text, "duration in milliseconds"))
    }
}

// ─── Nullable and collections ───────────────────────────────────────────────

/// The empty string means absent. `Some(String::new())` therefore decodes as
/// `None`; use a plain `String` where empty and absent must coincide.
impl<T: WireType> WireType for Option<T> {
    fn describe() -> TypeDesc {
        TypeDesc::nullable(T::describe())
    }

    fn encode(&self, cx: &Endpoint) -> TwsResult<String> {
        match self {
            Some(value) => value.encode(cx),
            None => Ok(String::new()),
        }
    }

    fn decode(text: &str, cx: &Endpoint) -> TwsResult<Self> {
        if text.is_empty() {
            Ok(None)
        } else {
            T::decode(text, cx).map(Some)
        }
    }

    fn into_outcome(self, cx: &Endpoint) -> TwsResult<Outcome> {
        match self {
            Some(value) => value.into_outcome(cx),
            None => Ok(Outcome::Value(String::new())),
        }
    }
}

/// `[e1,e2,...]`. Element text is escaped so separators inside elements
/// survive. A collection holding one empty element is written `[\]`, a
/// lone escape that no other content produces, so it stays apart from `[]`.
impl<T: WireType> WireType for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::collection(T::describe())
    }

    fn encode(&self, cx: &Endpoint) -> TwsResult<String> {
        if let [only] = self.as_slice() {
            let text = only.encode(cx)?;
            if text.is_empty() {
                return Ok(format!("[{SINGLE_EMPTY}]"));
            }
        }
        let mut out = String::from("[");
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            escape_into(&item.encode(cx)?, &mut out);
        }
        out.push(']');
        Ok(out)
    }

    fn decode(text: &str, cx: &Endpoint) -> TwsResult<Self> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let inner = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| malformed(text, "collection"))?;
        match inner {
            "" => return Ok(Vec::new()),
            SINGLE_EMPTY => return Ok(vec![T::decode("", cx)?]),
            _ => {}
        }
        split_elements(inner)?
            .iter()
            .map(|element| T::decode(element, cx))
            .collect()
    }
}

const ESCAPED: [char; 4] = ['\\', ',', '[', ']'];

/// Body of a collection whose only element encodes as `""`.
const SINGLE_EMPTY: &str = "\\";

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        if ESCAPED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Split on unescaped commas, removing one level of escaping.
pub(crate) fn split_elements(inner: &str) -> TwsResult<Vec<String>> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err(malformed(inner, "collection element (dangling escape)")),
            },
            ',' => elements.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    elements.push(current);
    Ok(elements)
}

// ─── Remote references ──────────────────────────────────────────────────────

/// A local object passed by reference. Encoding registers it with the
/// endpoint's session; decoding only succeeds for addresses owned by that
/// same endpoint.
impl<T: Remotable> WireType for Arc<T> {
    fn describe() -> TypeDesc {
        TypeDesc::remote(T::NAME)
    }

    fn encode(&self, cx: &Endpoint) -> TwsResult<String> {
        let object = LocalObject::new(Arc::clone(self), cx.registry());
        cx.export(object).map(|address| address.to_string())
    }

    fn decode(text: &str, cx: &Endpoint) -> TwsResult<Self> {
        let address = Address::parse(text)?;
        cx.resolve_local::<T>(&address).ok_or_else(|| {
            TwsError::format(format!(
                "'{text}' is not a local {}; receive remote references as Proxy",
                T::NAME
            ))
        })
    }

    fn into_outcome(self, cx: &Endpoint) -> TwsResult<Outcome> {
        Ok(Outcome::Object(LocalObject::new(self, cx.registry())))
    }
}

/// Stubs pass through unchanged: their address is sent as is. A stub
/// reached through properties travels as its path-extended address.
impl<I: Capability> WireType for Proxy<I> {
    fn describe() -> TypeDesc {
        TypeDesc::remote(I::NAME)
    }

    fn encode(&self, _cx: &Endpoint) -> TwsResult<String> {
        Ok(self.member_address().to_string())
    }

    fn decode(text: &str, cx: &Endpoint) -> TwsResult<Self> {
        if text.is_empty() {
            return Err(TwsError::format(format!(
                "null reference to {}; declare the value as Option<Proxy<_>>",
                I::NAME
            )));
        }
        Ok(Proxy::bind(cx, Address::parse(text)?))
    }
}

// ─── Argument tuples ────────────────────────────────────────────────────────

/// Named arguments of a dispatched method, decoded from a flat parameter set.
pub trait WireArgs<const N: usize>: Sized + Send + 'static {
    fn describe(names: [&'static str; N]) -> Vec<(&'static str, TypeDesc)>;

    fn decode(names: &[&'static str; N], params: &Params, cx: &Endpoint) -> TwsResult<Self>;
}

impl WireArgs<0> for () {
    fn describe(_names: [&'static str; 0]) -> Vec<(&'static str, TypeDesc)> {
        Vec::new()
    }

    fn decode(_names: &[&'static str; 0], _params: &Params, _cx: &Endpoint) -> TwsResult<Self> {
        Ok(())
    }
}

fn param<'a>(params: &'a Params, name: &str) -> TwsResult<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| TwsError::format(format!("missing parameter '{name}'")))
}

macro_rules! wire_args {
    ($n:literal; $($T:ident $i:tt),+) => {
        impl<$($T: WireType),+> WireArgs<$n> for ($($T,)+) {
            fn describe(names: [&'static str; $n]) -> Vec<(&'static str, TypeDesc)> {
                vec![$((names[$i], $T::describe())),+]
            }

            fn decode(names: &[&'static str; $n], params: &Params, cx: &Endpoint) -> TwsResult<Self> {
                Ok(($($T::decode(param(params, names[$i])?, cx)?,)+))
            }
        }
    };
}

wire_args!(1; A 0);
wire_args!(2; A 0, B 1);
wire_args!(3; A 0, B 1, C 2);
wire_args!(4; A 0, B 1, C 2, D 3);

// ─── Declarative impls ──────────────────────────────────────────────────────

/// Implement [`WireType`] for a fieldless enum, encoded by variant name.
/// Decoding ignores ASCII case.
#[macro_export]
macro_rules! wire_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::WireType for $ty {
            fn describe() -> $crate::tws_protocol::TypeDesc {
                $crate::tws_protocol::TypeDesc::Enum {
                    name: stringify!($ty).into(),
                    variants: vec![$(stringify!($variant).into()),+],
                }
            }

            fn encode(&self, _cx: &$crate::Endpoint) -> $crate::tws_protocol::TwsResult<String> {
                Ok(match self {
                    $($ty::$variant => stringify!($variant),)+
                }
                .to_string())
            }

            fn decode(text: &str, _cx: &$crate::Endpoint) -> $crate::tws_protocol::TwsResult<Self> {
                $(
                    if text.eq_ignore_ascii_case(stringify!($variant)) {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::tws_protocol::TwsError::format(format!(
                    "'{}' is not a variant of {}",
                    text,
                    stringify!($ty)
                )))
            }
        }
    };
}

/// Implement [`WireType`] for a serde data object, encoded as a JSON object
/// of field name to value. Nested data objects are allowed.
#[macro_export]
macro_rules! wire_data {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::WireType for $ty {
            fn describe() -> $crate::tws_protocol::TypeDesc {
                $crate::tws_protocol::TypeDesc::Data {
                    name: stringify!($ty).into(),
                }
            }

            fn encode(&self, _cx: &$crate::Endpoint) -> $crate::tws_protocol::TwsResult<String> {
                $crate::serde_json::to_string(self)
                    .map_err(|e| $crate::tws_protocol::TwsError::format(e.to_string()))
            }

            fn decode(text: &str, _cx: &$crate::Endpoint) -> $crate::tws_protocol::TwsResult<Self> {
                $crate::serde_json::from_str(text).map_err(|e| {
                    $crate::tws_protocol::TwsError::format(format!(
                        "'{}' is not a valid {}: {}",
                        text,
                        stringify!($ty),
                        e
                    ))
                })
            }
        }
    )+};
}
