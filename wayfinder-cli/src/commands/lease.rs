//! Lease commands driving the registration pipeline

use anyhow::Result;
use std::time::Duration;
use wayfinder::{ClientConfig, ClientFactory, DiscoveryHttpClient, InstanceInfo, StandardClientFactory};

fn instance_of(config: &ClientConfig) -> InstanceInfo {
    let instance = &config.instance;
    InstanceInfo::new(
        instance.app_name.clone(),
        instance.instance_id.clone(),
        instance.host_name.clone(),
        instance.port,
    )
    .with_zone(config.my_zone())
}

async fn register(client: &dyn DiscoveryHttpClient, instance: InstanceInfo) -> Result<()> {
    let app = instance.app.clone();
    let id = instance.instance_id.clone();
    let response = client.register(instance).await?;
    if !response.is_success() {
        anyhow::bail!("Register {}/{} failed with status {}", app, id, response.status);
    }
    println!("Registered {}/{} (status {})", app, id, response.status);
    Ok(())
}

/// Register the configured instance
pub async fn run_register(factory: &StandardClientFactory, config: &ClientConfig) -> Result<()> {
    let client = factory.new_client()?;
    register(client.as_ref(), instance_of(config)).await
}

/// Renew the lease, re-registering when the server no longer knows it
pub async fn run_heartbeat(
    factory: &StandardClientFactory,
    config: &ClientConfig,
    count: u32,
    interval_secs: u64,
) -> Result<()> {
    let client = factory.new_client()?;
    let instance = instance_of(config);

    for beat in 1..=count {
        let response = client.renew(&instance.app, &instance.instance_id, None).await?;
        match response.status {
            404 => {
                tracing::warn!(
                    app = %instance.app,
                    instance_id = %instance.instance_id,
                    "Lease unknown to server, re-registering"
                );
                register(client.as_ref(), instance.clone()).await?;
            }
            status if response.is_success() => {
                println!(
                    "Heartbeat {}/{}: {}/{} renewed (status {})",
                    beat, count, instance.app, instance.instance_id, status
                );
            }
            status => anyhow::bail!("Heartbeat failed with status {}", status),
        }

        if beat < count {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    }

    Ok(())
}

/// Cancel the lease of the configured instance
pub async fn run_cancel(factory: &StandardClientFactory, config: &ClientConfig) -> Result<()> {
    let client = factory.new_client()?;
    let instance = instance_of(config);
    let response = client.cancel(&instance.app, &instance.instance_id).await?;
    println!(
        "Cancelled {}/{} (status {})",
        instance.app, instance.instance_id, response.status
    );
    Ok(())
}
