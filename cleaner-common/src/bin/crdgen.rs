use cleaner_common::crd::CronExecutionCleaner;
use eyre::Result;
use kube::CustomResourceExt;

/// Print the CustomResourceDefinition so it can be piped into `kubectl apply -f -`.
fn main() -> Result<()> {
    let crd = CronExecutionCleaner::crd();
    println!("{}", serde_json::to_string_pretty(&crd)?);

    Ok(())
}
