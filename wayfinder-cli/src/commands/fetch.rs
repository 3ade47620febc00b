use anyhow::Result;
use wayfinder::{ClientFactory, LocalRegistry, StandardClientFactory};

/// Fetch the registry and print it
pub async fn run_fetch(factory: &StandardClientFactory, registry: &LocalRegistry, app: Option<&str>) -> Result<()> {
    let client = factory.new_client()?;
    let kind = registry.fetch(client.as_ref()).await?;
    tracing::debug!(?kind, "Registry fetched");

    let Some(applications) = registry.applications() else {
        anyhow::bail!("Registry is empty after fetch");
    };

    println!("Registry");
    println!("========");
    println!("Applications: {}", applications.applications.len());
    println!("Instances:    {}", applications.instance_count());
    println!(
        "Hash code:    {}",
        applications.apps_hash_code.as_deref().unwrap_or("-")
    );
    println!();

    println!(
        "{:<24} {:<28} {:<24} {:<6} {:<16} {}",
        "APP", "INSTANCE", "HOST", "PORT", "ZONE", "STATUS"
    );
    println!("{}", "-".repeat(110));
    for application in applications
        .applications
        .iter()
        .filter(|a| app.map_or(true, |name| a.name.eq_ignore_ascii_case(name)))
    {
        for instance in &application.instances {
            println!(
                "{:<24} {:<28} {:<24} {:<6} {:<16} {}",
                application.name,
                instance.instance_id,
                instance.host_name,
                instance.port,
                instance.zone.as_deref().unwrap_or("-"),
                instance.status
            );
        }
    }

    Ok(())
}
