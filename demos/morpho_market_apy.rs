//! Supply and borrow rates of the listed Morpho Blue markets and MetaMorpho vaults.

use clap::Parser;
use defi_adapters::{
    B256, Chain,
    adapters::{
        metamorpho::{self, vault_apy},
        morpho_blue::{self, MORPHO, contracts::IMorpho, pool_apy},
    },
    evm,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// RPC url
    #[arg(short, long, default_value = "https://eth.llamarpc.com")]
    rpc_url: String,
    #[arg(short, long, default_value = "ethereum")]
    chain: Chain,
    /// Market ids; the listed markets when omitted.
    #[arg(short, long)]
    market: Vec<B256>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = simple_logger::init_with_level(log::Level::Debug);
    let args = Cli::parse();

    println!("Connecting to RPC endpoint: {}", args.rpc_url);
    let provider = evm::connect_dyn(&args.rpc_url).await?;

    let markets = if args.market.is_empty() {
        morpho_blue::markets(args.chain).to_vec()
    } else {
        args.market
    };

    let morpho = IMorpho::new(MORPHO, provider.clone());
    for id in markets {
        let params = morpho.idToMarketParams(id).call().await?;
        let market = morpho.market(id).call().await?;
        let apy = pool_apy(&provider, params, market, None).await?;
        println!(
            "{id}: supply {:.2}% (apr {:.2}%), borrow {:.2}% (apr {:.2}%)",
            apy.supply * 100.0,
            apy.supply_apr() * 100.0,
            apy.borrow * 100.0,
            apy.borrow_apr() * 100.0,
        );
    }

    for vault in metamorpho::vaults(args.chain) {
        let apy = vault_apy(&provider, *vault, None).await?;
        println!(
            "vault {vault}: {:.2}% over {} markets",
            apy.apy() * 100.0,
            apy.components.len()
        );
    }

    Ok(())
}
