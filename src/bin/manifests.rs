use prometheus_source::manifests::{Release, ReleaseOptions};

fn main() -> anyhow::Result<()> {
    let options = ReleaseOptions::from_env()?;
    print!("{}", Release::new(&options).to_yaml()?);
    Ok(())
}
