use contract_tracer::rpc::{self, Endpoint};
use eyre::eyre;
use std::{env, time::Duration};

/// Quick node check: latest height and transaction counts of the last
/// few blocks. Usage: `probe_rpc [depth]`.
#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let raw = env::var("RPC_HTTP_URL").unwrap_or_else(|_| "http://localhost:8545".to_string());
    let endpoint =
        Endpoint::parse(&raw).ok_or_else(|| eyre!("unsupported RPC endpoint {raw:?}"))?;
    let depth: u64 = env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(10);

    let client = rpc::connect(&endpoint, Duration::from_secs(15)).await?;
    println!("Probing {}", endpoint);

    let latest = client.current_height().await?;
    println!("Latest block: {}", latest);

    for number in latest.saturating_sub(depth).max(1)..=latest {
        match client.transaction_count(number).await {
            Ok(count) => println!("Block: {} | Txs: {}", number, count),
            Err(e) => eprintln!("Block: {} | error: {}", number, e),
        }
    }

    Ok(())
}
