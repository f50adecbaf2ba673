//! Walk through the gateway with simulated upstreams.
//!
//! Run with:
//! ```sh
//! cargo run --example consensus
//! cargo run --example consensus -- gateway.toml
//! ```

use consensus_gateway::{
    AggregatorBuilder, ClientIdentity, GatewayError, GatewaySettings, ProviderClient,
    StaticProvider,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MARKET_SOURCES: &[(&str, &[&str])] = &[
    ("crypto", &["coingecko", "binance", "kraken"]),
    ("stocks", &["finnhub", "alpha-vantage", "polygon"]),
    ("sports", &["the-odds-api", "sportsdata"]),
    ("weather", &["open-meteo", "weatherapi"]),
    ("blockchain", &["solscan", "etherscan", "polygonscan"]),
    ("defi", &["defillama", "yearn", "aave"]),
];

const MODELS: &[(&str, f64)] = &[
    ("openai", 0.95),
    ("gemini", 0.92),
    ("cohere", 0.85),
    ("grok", 0.88),
    ("anthropic", 0.94),
    ("openrouter", 0.90),
    ("ollama", 0.75),
    ("huggingface", 0.80),
];

fn market_source(id: &str, category: &str) -> StaticProvider {
    let provider = StaticProvider::new(id, 0.9)
        .with_latency(Duration::from_millis(40))
        .with_payload(json!({ "source": id, "category": category }));

    // One upstream per demo run misbehaves so partial results show up
    match id {
        "kraken" => provider.with_latency(Duration::from_secs(10)),
        "polygon" => provider.failing("HTTP 429 from upstream"),
        _ => provider,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match std::env::args().nth(1) {
        Some(path) => GatewaySettings::load(path)?,
        None => GatewaySettings::default(),
    };
    settings.logging.init()?;

    let mut builder = AggregatorBuilder::from_settings(&settings)
        .with_max_requests(settings.limiter.max_requests.min(5));

    for (category, sources) in MARKET_SOURCES {
        for id in *sources {
            builder = builder.with_provider(*category, market_source(id, category));
        }
    }
    let models: Vec<Arc<dyn ProviderClient>> = MODELS
        .iter()
        .map(|&(id, confidence)| {
            Arc::new(
                StaticProvider::new(id, confidence)
                    .with_latency(Duration::from_millis(120))
                    .with_payload(json!({ "model": id, "verdict": "bullish" })),
            ) as Arc<dyn ProviderClient>
        })
        .collect();
    builder = builder.with_providers("analysis", models);

    let gateway = builder.build()?;
    let maintenance = gateway.spawn_maintenance(settings.maintenance.interval())?;
    info!(categories = ?gateway.categories(), "gateway ready");

    let caller = ClientIdentity::from("demo-api-key");

    println!("\n=== Fan-out across every AI model ===");
    let response = gateway
        .handle(&caller, "analysis", "BTC outlook for Q4")
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    println!("\n=== Partial result: one exchange times out ===");
    let response = gateway.handle(&caller, "crypto", "BTC/USD").await?;
    println!(
        "status={:?} consensus={:?} succeeded={}/{}",
        response.status(),
        response.consensus_score(),
        response.succeeded(),
        response.results().len()
    );

    println!("\n=== Same query again is served from cache ===");
    let response = gateway.handle(&caller, "Crypto", "  btc/usd ").await?;
    println!("cache_hit={}", response.cache_hit());

    println!("\n=== Unknown category ===");
    if let Err(e) = gateway.handle(&caller, "horoscopes", "leo").await {
        println!("error: {}", e);
    }

    println!("\n=== Exhausting the rate limit ===");
    for attempt in 1..=3 {
        match gateway.handle(&caller, "weather", "Lisbon").await {
            Ok(response) => println!("attempt {}: {:?}", attempt, response.status()),
            Err(GatewayError::RateLimitExceeded { retry_after, .. }) => {
                warn!(?retry_after, "caller throttled");
                println!("attempt {}: rejected, retry after {:?}", attempt, retry_after);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n=== Status ===");
    println!("{}", serde_json::to_string_pretty(&gateway.status())?);

    maintenance.shutdown().await?;
    Ok(())
}
