use contract_tracer::{
    abi, config,
    events::{EventDispatcher, EventKind, TraceEvent},
    output::{self, OutputFormat, Renderer, VERBOSITY_HIGH, VERBOSITY_MEDIUM},
    rpc,
    scanner::Scanner,
    selector::SelectorTable,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg = config::load()?;

    // RUST_LOG wins over the verbosity flag; stdout stays reserved for results
    let level = match cfg.verbosity {
        v if v >= VERBOSITY_HIGH => "debug",
        VERBOSITY_MEDIUM => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("Contract tracer starting...");
    info!("  RPC endpoint: {}", cfg.rpc_endpoint);
    info!("  Contract: {}", cfg.contract_address);
    info!("  ABI: {}", cfg.abi_path.display());
    info!("  Anchor: {:?}, offset: {}", cfg.anchor, cfg.offset);

    let entries = abi::load_abi(&cfg.abi_path)?;
    let table = Arc::new(SelectorTable::build(&entries)?);
    info!("Loaded {} functions from ABI", table.len());

    if cfg.output == OutputFormat::Console && cfg.verbosity >= VERBOSITY_HIGH {
        println!("{}", output::function_table(&table));
    }

    let client = rpc::connect(&cfg.rpc_endpoint, cfg.rpc_timeout()).await?;
    let scanner = Scanner::new(client, table, cfg.contract_address, cfg.scan_options());
    let range = scanner.resolve_range(cfg.anchor, cfg.offset).await?;

    let (stream, handle) = scanner.scan(range);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping...");
            cancel.cancel();
        }
    });

    let renderer = Renderer::new(cfg.output, cfg.verbosity);
    let console = cfg.output == OutputFormat::Console;
    EventDispatcher::new()
        .on(EventKind::Started, move |event| {
            if let TraceEvent::Started {
                start_block,
                end_block,
            } = event
            {
                if console {
                    println!("Anchor block {end_block}. Diving to {start_block}.");
                }
            }
        })
        .on(EventKind::Matched, move |event| {
            if let TraceEvent::Matched { block, tx, call } = event {
                println!("{}", renderer.render(block, tx, call));
            }
        })
        .on(EventKind::Progress, |event| {
            if let Some(number) = event.block_number() {
                info!("Reached block {}", number);
            }
        })
        .on(EventKind::Failed, |event| {
            if let TraceEvent::Failed {
                error,
                block_number,
            } = event
            {
                error!("Block {:?}: {}", block_number, error);
            }
        })
        .on(EventKind::Finished, move |_| {
            if console {
                println!("\nDone");
            }
        })
        .run(stream)
        .await;

    let report = handle.join().await?;
    info!(
        "Contract tracer stopped: {} matched transactions in {} blocks{}",
        report.matched,
        report.blocks_visited,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
