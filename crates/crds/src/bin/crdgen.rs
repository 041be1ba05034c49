//! Prints the CustomResourceDefinitions owned by the Landscaper provider as
//! a multi-document YAML stream.

use crds::{AccessRequest, ClusterRequest, LandscaperInstance, LandscaperProviderConfig};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        LandscaperInstance::crd(),
        LandscaperProviderConfig::crd(),
        ClusterRequest::crd(),
        AccessRequest::crd(),
    ];

    for crd in &crds {
        println!("---");
        print!("{}", serde_yaml::to_string(crd)?);
    }

    Ok(())
}
