//! Resource model shared by the reconciler and the stream consumer.

use std::fmt;
use std::sync::Arc;

use mirror_cache::KeyDeriver;
use serde::{Deserialize, Serialize};

/// Kind and API version of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// Kind tag. Remote stores frequently omit it from list items.
    #[serde(default)]
    pub kind: String,
    /// API group and version.
    #[serde(default)]
    pub api_version: String,
}

/// Identity and version of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, unique within its namespace.
    pub name: String,
    /// Namespace, `None` for cluster-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Opaque version token.
    #[serde(default)]
    pub resource_version: String,
    /// Remote-assigned unique id.
    #[serde(default)]
    pub uid: String,
}

impl ObjectMeta {
    /// Metadata for a cluster-scoped object.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Metadata for a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Set the resource version.
    #[must_use]
    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = version.into();
        self
    }
}

/// A remotely versioned, typed record that can be mirrored.
///
/// Value equality (`PartialEq`) is what the default merge strategy uses to
/// decide whether a cached entry is stale.
pub trait Resource: Clone + Send + Sync + 'static {
    /// Kind tag, also the cache key prefix for this kind.
    const KIND: &'static str;

    /// Whether objects live in a namespace. Cluster-scoped kinds are always
    /// listed across all namespaces.
    const NAMESPACED: bool = true;

    /// Type metadata.
    fn type_meta(&self) -> &TypeMeta;

    /// Mutable type metadata.
    fn type_meta_mut(&mut self) -> &mut TypeMeta;

    /// Object metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Mutable object metadata.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

/// Fill in the kind tag when the remote omitted it.
pub fn normalize<R: Resource>(mut object: R) -> R {
    if object.type_meta().kind.is_empty() {
        object.type_meta_mut().kind = R::KIND.to_string();
    }
    object
}

/// Key prefix shared by every cache entry of kind `R`.
pub fn kind_prefix<R: Resource>() -> String {
    format!("{}/", R::KIND)
}

/// Primary key of an object: `kind/namespace/name`.
///
/// Returns `None` when the kind tag or the name is empty.
pub fn resource_key<R: Resource>(object: &R) -> Option<String> {
    let kind = &object.type_meta().kind;
    let meta = object.metadata();
    if kind.is_empty() || meta.name.is_empty() {
        return None;
    }
    Some(format!(
        "{kind}/{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name
    ))
}

/// Key deriver for caches whose entries are resources.
pub fn resource_key_deriver<E: Resource>() -> KeyDeriver<E> {
    Arc::new(|entry: &E| Ok(resource_key(entry)))
}

/// Full listing of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<R> {
    /// Items currently present.
    pub items: Vec<R>,
    /// Version at which the listing was taken. A change stream opened at this
    /// version misses nothing and repeats nothing.
    pub resource_version: String,
}

/// Status carried by an error event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatus {
    /// Numeric status code.
    pub code: u16,
    /// Human readable reason.
    pub message: String,
}

impl ErrorStatus {
    /// Create a new status.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// One entry of a change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent<R> {
    /// Object created.
    Added(R),
    /// Object changed.
    Modified(R),
    /// Object removed; carries its last state.
    Deleted(R),
    /// Terminal error; the stream cannot continue.
    Error(ErrorStatus),
}

impl<R> WatchEvent<R> {
    /// Wire name of the event type.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "ADDED",
            Self::Modified(_) => "MODIFIED",
            Self::Deleted(_) => "DELETED",
            Self::Error(_) => "ERROR",
        }
    }
}

/// Which part of a collection a watcher mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every namespace, and cluster-scoped kinds.
    AllNamespaces,
    /// A single namespace.
    Namespace(String),
}

impl Scope {
    /// Whether an object with the given namespace is inside this scope.
    pub fn contains(&self, namespace: Option<&str>) -> bool {
        match self {
            Self::AllNamespaces => true,
            Self::Namespace(ns) => namespace == Some(ns.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllNamespaces => write!(f, "*"),
            Self::Namespace(ns) => write!(f, "{ns}"),
        }
    }
}
