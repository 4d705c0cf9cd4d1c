//! Destination resolution
//!
//! Resolution order:
//! 1. validate the destination;
//! 2. track the referenced object for the observer (before any lookup, so a
//!    missing or unready object still re-enqueues the observer later);
//! 3. derive the address of the referenced object: cluster DNS plus port
//!    selection for services, `status.address.url` for everything else;
//! 4. resolve a relative URI suffix against that address;
//! 5. append the path.

use crate::destination::{has_scheme, Destination, Target};
use crate::error::ResolveError;
use crate::ports::{select_port, service_hostname, service_url};
use crate::store::{Addressable, ObjectStore, PortExposing, StoreError, StoredObject};
use crds::{DestinationSpec, Reference};
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracker::{ObserverKey, Tracker};

/// Default DNS suffix of in-cluster service names.
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default annotation selecting a service port by name.
pub const DEFAULT_PORT_ANNOTATION: &str = "bindings.microscaler.io/port";

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// DNS suffix used for service host names
    pub cluster_domain: String,
    /// Annotation naming the service port to use
    pub port_annotation: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            port_annotation: DEFAULT_PORT_ANNOTATION.to_string(),
        }
    }
}

/// Resolves destinations to absolute URIs and tracks what they reference.
pub struct DestinationResolver {
    store: Arc<dyn ObjectStore>,
    tracker: Arc<Tracker>,
    config: ResolverConfig,
}

impl std::fmt::Debug for DestinationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationResolver")
            .field("tracker", &self.tracker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DestinationResolver {
    /// Creates a resolver reading from `store` and registering leases with `tracker`.
    pub fn new(store: Arc<dyn ObjectStore>, tracker: Arc<Tracker>, config: ResolverConfig) -> Self {
        Self {
            store,
            tracker,
            config,
        }
    }

    /// The tracker leases are registered with.
    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Validates `spec` and resolves it as seen by `observer`.
    pub async fn uri_from_destination(
        &self,
        spec: &DestinationSpec,
        observer: &ObserverKey,
    ) -> Result<String, ResolveError> {
        let destination = Destination::try_from(spec)?;
        self.resolve(&destination, observer).await
    }

    /// Resolves an already validated destination as seen by `observer`.
    pub async fn resolve(
        &self,
        destination: &Destination,
        observer: &ObserverKey,
    ) -> Result<String, ResolveError> {
        // A URI given directly keeps its written form, root slash included.
        let (mut url, written) = match destination.target() {
            Target::Uri(url) => (url.clone(), true),
            Target::Ref(reference) => (self.url_from_reference(reference, observer).await?, false),
            Target::RefWithSuffix(reference, suffix) => {
                let base = self.url_from_reference(reference, observer).await?;
                let joined = base.join(suffix).map_err(|e| ResolveError::InvalidSuffix {
                    base: base.to_string(),
                    suffix: suffix.clone(),
                    reason: e.to_string(),
                })?;
                (joined, false)
            }
        };

        if let Some(path) = destination.path() {
            join_path(&mut url, path);
        }

        let uri = if written { url.to_string() } else { render(&url) };
        info!("Resolved destination for {} to {}", observer, uri);
        Ok(uri)
    }

    /// Tracks `reference` for `observer`, then reads its address.
    async fn url_from_reference(
        &self,
        reference: &Reference,
        observer: &ObserverKey,
    ) -> Result<Url, ResolveError> {
        self.tracker.track(reference, observer)?;

        let object = match self.store.get_by_reference(reference).await {
            Ok(object) => object,
            Err(StoreError::NotFound(_)) => {
                debug!("{} not found yet, {} will be re-enqueued when it appears", reference, observer);
                return Err(ResolveError::NotFound {
                    reference: reference.canonical_key(),
                });
            }
            Err(e) => {
                warn!("Failed to read {}: {}", reference, e);
                return Err(ResolveError::Store(e));
            }
        };

        match object {
            StoredObject::Service(service) => self.url_from_ports(&service, reference),
            StoredObject::Addressable(obj) => url_from_address(&obj, reference),
        }
    }

    fn url_from_ports<S: PortExposing + ?Sized>(
        &self,
        service: &S,
        reference: &Reference,
    ) -> Result<Url, ResolveError> {
        let name = reference.object_name().unwrap_or_default();
        let host = service_hostname(name, &reference.namespace, &self.config.cluster_domain);
        let port = select_port(service, &self.config.port_annotation, reference)?;
        service_url(&host, port, reference)
    }
}

fn url_from_address<A: Addressable + ?Sized>(obj: &A, reference: &Reference) -> Result<Url, ResolveError> {
    let address = obj.address().ok_or_else(|| ResolveError::AddressNotSet {
        reference: reference.canonical_key(),
    })?;
    let raw = address
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ResolveError::UrlMissing {
            reference: reference.canonical_key(),
        })?;

    let host_missing = || ResolveError::HostMissing {
        reference: reference.canonical_key(),
        url: raw.to_string(),
    };
    if !has_scheme(raw) {
        return Err(host_missing());
    }
    let url = Url::parse(raw).map_err(|e| ResolveError::InvalidAddress {
        reference: reference.canonical_key(),
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(host_missing());
    }
    Ok(url)
}

/// Appends `suffix` to the URL path with exactly one separator between them.
fn join_path(url: &mut Url, suffix: &str) {
    let base = url.path();
    let joined = match (base.ends_with('/'), suffix.strip_prefix('/')) {
        (true, Some(rest)) => format!("{base}{rest}"),
        (false, None) => format!("{base}/{suffix}"),
        _ => format!("{base}{suffix}"),
    };
    url.set_path(&joined);
}

/// String form of a resolved address, without the `/` the parser adds to an
/// empty path.
fn render(url: &Url) -> String {
    let s = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        s.strip_suffix('/').unwrap_or(s).to_string()
    } else {
        s.to_string()
    }
}
