//! Prints a user's positions across every adapter on a chain, valued in USD.
//!
//! ```sh
//! cargo run --example positions -- --user 0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f
//! ```

use clap::Parser;
use defi_adapters::{
    Address, AdaptersController, Chain, Config, GetPositionsInput,
    aggregate::aggregate_fiat_balances,
    decorators::{ResolveOptions, resolve_underlying_positions},
    evm::try_from_wei,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wallet to inspect.
    #[arg(short, long)]
    user: Address,
    #[arg(short, long, default_value = "ethereum")]
    chain: Chain,
    /// Block to read at; latest when omitted.
    #[arg(short, long)]
    block: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = simple_logger::init_with_level(log::Level::Info);
    let args = Cli::parse();

    let config = Config::from_env()?.with_chains(&[args.chain]);
    let controller = AdaptersController::from_config(&config).await?;
    let options = ResolveOptions::default()
        .with_max_depth(config.resolve_depth)
        .with_fiat_prices();

    let mut input = GetPositionsInput::new(args.user);
    input.block_number = args.block;

    for adapter in controller.adapters_for(args.chain) {
        let positions = match adapter.positions(&input).await {
            Ok(positions) => positions,
            Err(err) if err.is_not_implemented() => continue,
            Err(err) => {
                log::warn!("{}: {err}", adapter.protocol_details().name);
                continue;
            }
        };
        if positions.is_empty() {
            continue;
        }

        let positions =
            resolve_underlying_positions(&controller, args.chain, args.block, positions, options)
                .await?;
        println!("{} ({})", adapter.protocol_details().name, adapter.product_id());
        for position in &positions {
            println!(
                "  {} {}",
                try_from_wei(position.balance_raw, position.token.decimals as u32)?,
                position.token.symbol
            );
            for underlying in &position.tokens {
                println!(
                    "    {} {} [{}]",
                    try_from_wei(underlying.balance_raw, underlying.token.decimals as u32)?,
                    underlying.token.symbol,
                    underlying.token_type
                );
            }
        }

        match aggregate_fiat_balances(&positions) {
            Ok(balances) => {
                for balance in balances.values() {
                    println!("  = ${} in {}", balance.fiat_value.round_dp(2), balance.token.symbol);
                }
            }
            Err(err) => log::warn!("not valued: {err}"),
        }
    }

    Ok(())
}
