use kube::CustomResourceExt;
use prometheus_source::crds::{PrometheusSource, Revision};

fn main() -> anyhow::Result<()> {
    let crds = vec![PrometheusSource::crd(), Revision::crd()];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
