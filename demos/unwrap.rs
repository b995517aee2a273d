//! Unwraps one protocol token all the way down to its leaf tokens.
//!
//! ```sh
//! cargo run --example unwrap -- --token 0x78Fc2c2eD1A4cDb5402365934aE5648aDAd094d0
//! ```

use clap::Parser;
use defi_adapters::{
    Address, AdaptersController, Chain, Config, UnwrapInput, Underlying,
    decorators::{ResolveOptions, resolve_underlying_rates},
    evm::try_from_wei,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Protocol token to unwrap.
    #[arg(short, long)]
    token: Address,
    #[arg(short, long, default_value = "ethereum")]
    chain: Chain,
    #[arg(short, long)]
    block: Option<u64>,
    /// Attach USD prices to the leaves.
    #[arg(long)]
    fiat: bool,
}

fn print(nodes: &[Underlying], depth: usize) -> anyhow::Result<()> {
    for node in nodes {
        println!(
            "{:indent$}{} {} [{}]",
            "",
            try_from_wei(node.balance_raw, node.token.decimals as u32)?,
            node.token.symbol,
            node.token_type,
            indent = depth * 2
        );
        print(&node.tokens, depth + 1)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = simple_logger::init_with_level(log::Level::Debug);
    let args = Cli::parse();

    let config = Config::from_env()?.with_chains(&[args.chain]);
    let controller = AdaptersController::from_config(&config).await?;

    let Some(adapter) = controller.token_adapter(args.chain, args.token).await? else {
        anyhow::bail!("no adapter owns {} on {}", args.token, args.chain);
    };
    let rate = adapter.unwrap(&UnwrapInput::new(args.token, args.block)).await?;

    let mut options = ResolveOptions::default().with_max_depth(config.resolve_depth);
    if args.fiat {
        options = options.with_fiat_prices();
    }
    let nodes =
        resolve_underlying_rates(&controller, args.chain, args.block, &rate, options).await?;

    println!(
        "1 {} ({}/{})",
        rate.token.symbol,
        adapter.protocol(),
        adapter.product_id()
    );
    print(&nodes, 1)?;
    Ok(())
}
