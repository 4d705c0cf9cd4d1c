//! Observer identities and changed-object accessors

use crds::Reference;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a dependent resource: its exact reference, never a selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverKey {
    /// API group (empty for the core group)
    pub api_group: String,
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ObserverKey {
    /// Builds a key from its identity fields.
    pub fn new(
        api_group: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_group: api_group.into(),
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a typed resource. `None` when the object has no name or namespace.
    pub fn from_resource<K>(obj: &K) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let meta = obj.meta();
        Some(Self::new(
            K::group(&()),
            K::version(&()),
            K::kind(&()),
            meta.namespace.clone()?,
            meta.name.clone()?,
        ))
    }

    /// The observer as an exact reference.
    pub fn to_reference(&self) -> Reference {
        Reference::named(
            self.api_group.clone(),
            self.api_version.clone(),
            self.kind.clone(),
            self.namespace.clone(),
            self.name.clone(),
        )
    }
}

impl fmt::Display for ObserverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_reference().canonical_key())
    }
}

/// Identity accessors the tracker needs from a changed object.
///
/// Every accessor is optional: change feeds may hand over partially populated
/// objects, and the tracker ignores anything it cannot identify.
pub trait ObjectIdentity {
    /// Group, version and kind of the object.
    fn gvk(&self) -> Option<GroupVersionKind>;
    /// Namespace of the object.
    fn namespace(&self) -> Option<&str>;
    /// Name of the object.
    fn name(&self) -> Option<&str>;
    /// Labels of the object.
    fn labels(&self) -> Option<&BTreeMap<String, String>>;
}

/// Splits an `apiVersion` field into group and version.
fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.rsplit_once('/').unwrap_or(("", api_version))
}

impl ObjectIdentity for DynamicObject {
    fn gvk(&self) -> Option<GroupVersionKind> {
        let types = self.types.as_ref()?;
        if types.kind.is_empty() || types.api_version.is_empty() {
            return None;
        }
        let (group, version) = split_api_version(&types.api_version);
        Some(GroupVersionKind::gvk(group, version, &types.kind))
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }
}

/// Owned snapshot of the identity of a changed object.
///
/// Adapts typed resources (whose kind is static) to [`ObjectIdentity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedObject {
    gvk: Option<GroupVersionKind>,
    namespace: Option<String>,
    name: Option<String>,
    labels: BTreeMap<String, String>,
}

impl ChangedObject {
    /// Snapshot from explicit fields.
    pub fn new(
        api_group: &str,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Self {
        Self {
            gvk: Some(GroupVersionKind::gvk(api_group, api_version, kind)),
            namespace: namespace.map(str::to_string),
            name: name.map(str::to_string),
            labels: BTreeMap::new(),
        }
    }

    /// Snapshot of a typed resource.
    pub fn from_resource<K>(obj: &K) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        let meta = obj.meta();
        Self {
            gvk: Some(GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            labels: meta.labels.clone().unwrap_or_default(),
        }
    }

    /// Adds labels to the snapshot.
    #[must_use]
    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl ObjectIdentity for ChangedObject {
    fn gvk(&self) -> Option<GroupVersionKind> {
        self.gvk.clone()
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        Some(&self.labels)
    }
}
