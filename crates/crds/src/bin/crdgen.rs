//! Prints the CRD manifests as YAML.
//!
//! `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use anyhow::Context;
use crds::SinkBinding;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&SinkBinding::crd()).context("Failed to serialize SinkBinding CRD")?;
    print!("{crd}");
    Ok(())
}
