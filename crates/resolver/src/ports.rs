//! Address derivation for plain services
//!
//! A service has no published address: its host comes from the cluster DNS
//! naming convention and its port is chosen from the ports it exposes.

use crate::error::ResolveError;
use crate::store::PortExposing;
use crds::Reference;
use reqwest::Url;

/// Picks the port to address a service on.
///
/// 1. If the port annotation is set, the port with that name, or `PortNotFound`.
/// 2. Otherwise the only port, if there is exactly one.
/// 3. Otherwise port 80, if exposed.
/// 4. Otherwise `AmbiguousPort`.
pub fn select_port<S: PortExposing + ?Sized>(
    service: &S,
    annotation: &str,
    reference: &Reference,
) -> Result<i32, ResolveError> {
    let ports = service.ports();

    if let Some(wanted) = service.annotation(annotation) {
        return ports
            .iter()
            .find(|p| p.name.as_deref() == Some(wanted))
            .map(|p| p.port)
            .ok_or_else(|| ResolveError::PortNotFound {
                reference: reference.canonical_key(),
                port: wanted.to_string(),
            });
    }

    match ports {
        [only] => Ok(only.port),
        _ if ports.iter().any(|p| p.port == 80) => Ok(80),
        _ => Err(ResolveError::AmbiguousPort {
            reference: reference.canonical_key(),
            count: ports.len(),
            annotation: annotation.to_string(),
        }),
    }
}

/// `{name}.{namespace}.svc.{cluster_domain}`
pub fn service_hostname(name: &str, namespace: &str, cluster_domain: &str) -> String {
    format!("{name}.{namespace}.svc.{cluster_domain}")
}

/// URL for `host` on `port`: 443 is `https` on the bare host, 80 is `http` on
/// the bare host, anything else is `http` on `host:port`.
pub fn service_url(host: &str, port: i32, reference: &Reference) -> Result<Url, ResolveError> {
    let raw = match port {
        443 => format!("https://{host}"),
        80 => format!("http://{host}"),
        other => format!("http://{host}:{other}"),
    };
    Url::parse(&raw).map_err(|e| ResolveError::InvalidAddress {
        reference: reference.canonical_key(),
        url: raw.clone(),
        reason: e.to_string(),
    })
}
