//! Controller configuration.
//!
//! Read once at startup from environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `WATCH_NAMESPACE` | all namespaces |
//! | `RESYNC_PERIOD_SECONDS` | 600 |
//! | `LEASE_DURATION_SECONDS` | 3 × resync period |
//! | `CLUSTER_DOMAIN` | `cluster.local` |
//! | `PORT_ANNOTATION` | `bindings.microscaler.io/port` |
//! | `ADDRESSABLE_KINDS` | none (comma-separated `group/version/Kind`) |

use crate::error::ControllerError;
use kube::core::GroupVersionKind;
use resolver::resolver::{DEFAULT_CLUSTER_DOMAIN, DEFAULT_PORT_ANNOTATION};
use resolver::ResolverConfig;
use std::env;
use std::time::Duration;

/// Default resync period in seconds
pub const DEFAULT_RESYNC_SECONDS: u64 = 600;

/// Leases outlive the resync period by this factor, so a binding renews its
/// lease well before it lapses.
pub const LEASE_RESYNC_FACTOR: u32 = 3;

/// Runtime configuration of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// How often every binding is re-resolved
    pub resync_period: Duration,
    /// How long a tracked reference stays registered without renewal
    pub lease_duration: Duration,
    /// DNS suffix of in-cluster service names
    pub cluster_domain: String,
    /// Annotation selecting a service port by name
    pub port_annotation: String,
    /// Addressable kinds whose changes are fed to the tracker
    pub addressable_kinds: Vec<GroupVersionKind>,
}

impl ControllerConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let resync_seconds = match get("RESYNC_PERIOD_SECONDS") {
            Some(raw) => parse_seconds("RESYNC_PERIOD_SECONDS", &raw)?,
            None => DEFAULT_RESYNC_SECONDS,
        };
        let resync_period = Duration::from_secs(resync_seconds);

        let lease_duration = match get("LEASE_DURATION_SECONDS") {
            Some(raw) => Duration::from_secs(parse_seconds("LEASE_DURATION_SECONDS", &raw)?),
            None => resync_period * LEASE_RESYNC_FACTOR,
        };
        if lease_duration <= resync_period {
            return Err(ControllerError::InvalidConfig(format!(
                "LEASE_DURATION_SECONDS ({}) must be greater than RESYNC_PERIOD_SECONDS ({})",
                lease_duration.as_secs(),
                resync_seconds
            )));
        }

        let addressable_kinds = get("ADDRESSABLE_KINDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(parse_kind)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            namespace: get("WATCH_NAMESPACE"),
            resync_period,
            lease_duration,
            cluster_domain: get("CLUSTER_DOMAIN").unwrap_or_else(|| DEFAULT_CLUSTER_DOMAIN.to_string()),
            port_annotation: get("PORT_ANNOTATION").unwrap_or_else(|| DEFAULT_PORT_ANNOTATION.to_string()),
            addressable_kinds,
        })
    }

    /// Resolver settings derived from this configuration.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            cluster_domain: self.cluster_domain.clone(),
            port_annotation: self.port_annotation.clone(),
        }
    }
}

fn parse_seconds(key: &str, raw: &str) -> Result<u64, ControllerError> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(ControllerError::InvalidConfig(format!(
            "{key} must be a positive number of seconds, got {raw:?}"
        ))),
        Ok(seconds) => Ok(seconds),
    }
}

/// Parses `group/version/Kind`, or `version/Kind` for the core group.
fn parse_kind(raw: &str) -> Result<GroupVersionKind, ControllerError> {
    let invalid = || {
        ControllerError::InvalidConfig(format!(
            "ADDRESSABLE_KINDS entry {raw:?} must be group/version/Kind"
        ))
    };

    let (api_version, kind) = raw.rsplit_once('/').ok_or_else(invalid)?;
    let (group, version) = api_version.rsplit_once('/').unwrap_or(("", api_version));
    if version.is_empty() || kind.is_empty() || group.contains('/') {
        return Err(invalid());
    }
    Ok(GroupVersionKind::gvk(group, version, kind))
}
