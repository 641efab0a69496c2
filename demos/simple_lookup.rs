//! Simple example of using the myip-service library
//!
//! Run with: cargo run --example simple_lookup --no-default-features [address...]

use myip_service::{Aggregator, Config, LookupRequest};
use std::sync::Arc;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for better debugging
    tracing_subscriber::fmt()
        .with_env_filter("myip_service=info")
        .init();

    println!("🔍 myip-service Library Example");
    println!("===============================");

    let config = Arc::new(Config::load()?);
    let aggregator = Aggregator::from_config(config.clone())?;

    let mut addresses: Vec<String> = std::env::args().skip(1).collect();
    if addresses.is_empty() {
        addresses = vec!["8.8.8.8".to_string(), "2606:4700:4700::1111".to_string(), "127.0.0.1".to_string()];
    }

    for address in addresses {
        println!("\n📋 Looking up: {}", address);
        println!("{}", "─".repeat(50));

        let mut request = LookupRequest::new(address.as_str(), Instant::now() + config.lookup_deadline());
        request.user_agent = Some("curl/8.4.0".to_string());

        let started = std::time::Instant::now();
        match aggregator.aggregate(request).await {
            Ok(result) => {
                println!("✅ {} ({})", result.remote_addr, result.remote_addr_family);
                if let Some(dns) = &result.reverse_dns {
                    match &dns.error {
                        Some(error) => println!("   DNS: ⚠️  {}", error),
                        None => println!("   DNS: {}", dns.names.join(", ")),
                    }
                }
                if let Some(whois) = &result.whois {
                    match (&whois.body, &whois.error) {
                        (Some(body), _) => {
                            let lines = body.lines().count();
                            println!("   Whois: {} lines", lines);
                            for line in body.lines().filter(|l| !l.trim().is_empty()).take(3) {
                                println!("     {}", line);
                            }
                        }
                        (None, Some(error)) => println!("   Whois: ⚠️  {}", error),
                        (None, None) => {}
                    }
                }
                println!("   Took: {:?}", started.elapsed());
            }
            Err(e) => {
                println!("❌ Error: {}", e);
            }
        }
    }

    println!("\n🎉 Example completed!");
    Ok(())
}
