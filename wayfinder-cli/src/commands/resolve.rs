use anyhow::Result;
use wayfinder::{ClusterResolver, StandardClientFactory};

/// Print the endpoints the client would try, in order
pub async fn run_resolve(factory: &StandardClientFactory) -> Result<()> {
    let resolver = factory.resolver();
    let snapshot = resolver.resolve().await?;
    let stats = resolver.stats();

    println!("Discovery Endpoints ({})", snapshot.region);
    println!("===================");
    println!("Refreshes: {} ok, {} failed", stats.successful_refreshes, stats.failed_refreshes);
    println!();

    if snapshot.is_empty() {
        println!("No endpoints resolved.");
        return Ok(());
    }

    println!("{:<4} {:<16} {:<24} {:<6} {}", "#", "ZONE", "HOST", "PORT", "SERVICE URL");
    println!("{}", "-".repeat(80));
    for (i, endpoint) in snapshot.iter().enumerate() {
        println!(
            "{:<4} {:<16} {:<24} {:<6} {}",
            i + 1,
            endpoint.zone(),
            endpoint.host(),
            endpoint.port(),
            endpoint.service_url()
        );
    }

    Ok(())
}
