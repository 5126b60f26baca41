//! Print the Memcached CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run --bin crdgen > config/crd/memcached.yaml`

use kube::CustomResourceExt;
use memcached_operator::crd::Memcached;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Memcached::crd())?);
    Ok(())
}
