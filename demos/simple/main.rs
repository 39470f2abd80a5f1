use std::time::Duration;

use targeting_engine::{DeliveryRequest, EngineConfig, MemorySource, TargetingEngine};

#[tokio::main(flavor = "current_thread")]
async fn main() -> targeting_engine::Result<()> {
    // Configure env_logger to see refresh logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("targeting")).init();

    let config = EngineConfig::new().with_refresh_interval(Duration::from_secs(5));
    let engine = TargetingEngine::start(MemorySource::with_sample_data(), config).await?;

    // Keep the snapshot fresh in the background.
    let poller = engine.start_poller_thread()?;

    for request in [
        DeliveryRequest::new("com.abc.xyz", "germany", "android"),
        DeliveryRequest::new("com.gametion.ludokinggame", "us", "android"),
        DeliveryRequest::new("x", "antarctica", "windows"),
        DeliveryRequest::new("com.abc.xyz", "", "android"),
    ] {
        match engine.get_matching_campaigns(&request) {
            Ok(campaigns) => println!(
                "{:?}: {}",
                request,
                serde_json::to_string(campaigns.as_slice()).unwrap_or_default()
            ),
            Err(err) => println!("{:?}: error: {}", request, err),
        }
    }

    println!(
        "Stats: {}",
        serde_json::to_string_pretty(&engine.get_stats()).unwrap_or_default()
    );

    poller.shutdown()?;

    Ok(())
}
