//! Interface descriptions: the IDL shared by dispatchers and stubs.
//!
//! A [`TypeDesc`] is a closed description of a wire type. Its [`TypeClass`]
//! is computed once when an interface is described, so unsupported shapes
//! are rejected before any call is made rather than per call.

use serde::{Deserialize, Serialize};

use crate::error::TwsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
}

/// Shape of a value crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeDesc {
    Void,
    Scalar(ScalarKind),
    /// Value with an application-supplied text form, e.g. durations as milliseconds.
    Custom { name: String },
    Enum { name: String, variants: Vec<String> },
    Nullable(Box<TypeDesc>),
    Collection(Box<TypeDesc>),
    /// Structured data object, serialized field by field.
    Data { name: String },
    /// Object that crosses the boundary as an address.
    Remote { interface: String },
    Unsupported { reason: String },
}

/// Closed classification of a [`TypeDesc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeClass {
    DataValue,
    Collection,
    Nullable,
    RemoteReference,
    Unsupported,
}

impl TypeDesc {
    pub fn nullable(inner: TypeDesc) -> Self {
        Self::Nullable(Box::new(inner))
    }

    pub fn collection(element: TypeDesc) -> Self {
        Self::Collection(Box::new(element))
    }

    pub fn remote(interface: impl Into<String>) -> Self {
        Self::Remote {
            interface: interface.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> TypeClass {
        match self {
            Self::Void
            | Self::Scalar(_)
            | Self::Custom { .. }
            | Self::Enum { .. }
            | Self::Data { .. } => TypeClass::DataValue,
            Self::Remote { .. } => TypeClass::RemoteReference,
            Self::Unsupported { .. } => TypeClass::Unsupported,
            // Remote references are already nullable.
            Self::Nullable(inner) => match inner.class() {
                TypeClass::RemoteReference => TypeClass::RemoteReference,
                TypeClass::DataValue if **inner != Self::Void => TypeClass::Nullable,
                TypeClass::Collection => TypeClass::Nullable,
                _ => TypeClass::Unsupported,
            },
            Self::Collection(element) => match element.class() {
                TypeClass::DataValue if **element != Self::Void => TypeClass::Collection,
                TypeClass::Collection | TypeClass::Nullable => TypeClass::Collection,
                _ => TypeClass::Unsupported,
            },
        }
    }

    pub fn is_supported(&self) -> bool {
        self.class() != TypeClass::Unsupported
    }

    /// Why this shape cannot cross the boundary, if it cannot.
    pub fn rejection(&self) -> Option<String> {
        if self.is_supported() {
            return None;
        }
        Some(match self {
            Self::Unsupported { reason } => reason.clone(),
            Self::Nullable(inner) => inner
                .rejection()
                .unwrap_or_else(|| format!("nullable {} is not supported", inner.label())),
            Self::Collection(element) => element
                .rejection()
                .unwrap_or_else(|| format!("collection of {} is not supported", element.label())),
            other => format!("{} is not supported", other.label()),
        })
    }

    /// Short human-readable name, used in error messages.
    pub fn label(&self) -> String {
        match self {
            Self::Void => "void".into(),
            Self::Scalar(kind) => format!("{kind:?}").to_lowercase(),
            Self::Custom { name } | Self::Enum { name, .. } | Self::Data { name } => name.clone(),
            Self::Nullable(inner) => format!("{}?", inner.label()),
            Self::Collection(element) => format!("[{}]", element.label()),
            Self::Remote { interface } => interface.clone(),
            Self::Unsupported { .. } => "unsupported".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDesc {
    pub name: String,
    pub ty: TypeDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MemberKind {
    Property {
        ty: TypeDesc,
        writable: bool,
    },
    Method {
        params: Vec<ParamDesc>,
        returns: TypeDesc,
        /// Takes type arguments; never invocable remotely.
        generic: bool,
        /// Completes asynchronously; the dispatcher awaits it.
        deferred: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDesc {
    pub name: String,
    #[serde(flatten)]
    pub kind: MemberKind,
}

impl MemberDesc {
    pub fn is_property(&self) -> bool {
        matches!(self.kind, MemberKind::Property { .. })
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.kind, MemberKind::Method { generic: true, .. })
    }

    /// Type of a property read or a method result.
    pub fn result_type(&self) -> &TypeDesc {
        match &self.kind {
            MemberKind::Property { ty, .. } => ty,
            MemberKind::Method { returns, .. } => returns,
        }
    }

    pub fn params(&self) -> &[ParamDesc] {
        match &self.kind {
            MemberKind::Property { .. } => &[],
            MemberKind::Method { params, .. } => params,
        }
    }

    /// True when the parameter names are exactly `names`, in any order.
    pub fn takes_exactly<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        let mut names: Vec<&str> = names.into_iter().collect();
        let mut own: Vec<&str> = self.params().iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        own.sort_unstable();
        names == own
    }

    /// Why this member can never be used over the wire, if it cannot.
    pub fn rejection(&self) -> Option<TwsError> {
        if self.is_generic() {
            return Some(TwsError::unsupported(format!(
                "generic member '{}' cannot be invoked remotely",
                self.name
            )));
        }
        for param in self.params() {
            if param.ty == TypeDesc::Void {
                return Some(TwsError::protocol(format!(
                    "parameter '{}' of '{}' has no value type",
                    param.name, self.name
                )));
            }
            if let Some(reason) = param.ty.rejection() {
                return Some(TwsError::protocol(format!(
                    "parameter '{}' of '{}': {reason}",
                    param.name, self.name
                )));
            }
        }
        if self.is_property() && *self.result_type() == TypeDesc::Void {
            return Some(TwsError::protocol(format!(
                "property '{}' has no value type",
                self.name
            )));
        }
        self.result_type().rejection().map(|reason| {
            TwsError::protocol(format!("result of '{}': {reason}", self.name))
        })
    }
}

/// Members of one remotable interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDesc {
    pub name: String,
    pub members: Vec<MemberDesc>,
}

impl InterfaceDesc {
    pub fn builder(name: impl Into<String>) -> InterfaceDescBuilder {
        InterfaceDescBuilder {
            desc: InterfaceDesc {
                name: name.into(),
                members: Vec::new(),
            },
        }
    }

    /// All members sharing `name`; several for overloaded methods.
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MemberDesc> + 'a {
        self.members.iter().filter(move |m| m.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&MemberDesc> {
        self.members.iter().find(|m| m.name == name && m.is_property())
    }
}

/// Fluent construction of an [`InterfaceDesc`].
pub struct InterfaceDescBuilder {
    desc: InterfaceDesc,
}

impl InterfaceDescBuilder {
    pub fn property(self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.member(name, MemberKind::Property { ty, writable: false })
    }

    pub fn property_mut(self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.member(name, MemberKind::Property { ty, writable: true })
    }

    pub fn method<'a>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, TypeDesc)>,
        returns: TypeDesc,
    ) -> Self {
        self.method_kind(name, params, returns, false, false)
    }

    pub fn method_async<'a>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, TypeDesc)>,
        returns: TypeDesc,
    ) -> Self {
        self.method_kind(name, params, returns, false, true)
    }

    pub fn generic_method<'a>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, TypeDesc)>,
        returns: TypeDesc,
    ) -> Self {
        self.method_kind(name, params, returns, true, false)
    }

    pub fn member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        self.desc.members.push(MemberDesc {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn build(self) -> InterfaceDesc {
        self.desc
    }

    fn method_kind<'a>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, TypeDesc)>,
        returns: TypeDesc,
        generic: bool,
        deferred: bool,
    ) -> Self {
        let params = params
            .into_iter()
            .map(|(name, ty)| ParamDesc {
                name: name.to_string(),
                ty,
            })
            .collect();
        self.member(
            name,
            MemberKind::Method {
                params,
                returns,
                generic,
                deferred,
            },
        )
    }
}
