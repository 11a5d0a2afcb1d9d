//! chainbalance CLI: fetch balance sheets from an Ethereum node.
//!
//! Usage:
//! ```bash
//! # Native balance at the latest block
//! chainbalance balances --url http://localhost:8545 --address 0x9fc2...af51
//!
//! # Token balances at two blocks, one aggregated call per block, with retries
//! chainbalance balances --url http://localhost:8545 --address 0x9fc2...af51 \
//!     --token 0xdac1...1ec7 --native --block 0x7270e0 --block 0x7270e1 \
//!     --multicall --retry 3
//! ```

use std::env;
use std::process;

mod cmd_balances;
mod logging;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "balances" => cmd_balances::run(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainbalance {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainbalance {}", env!("CARGO_PKG_VERSION"));
    println!("Fetch native and token balances for many addresses and blocks\n");
    println!("USAGE:");
    println!("    chainbalance <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    balances   Fetch a balance sheet");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("BALANCES FLAGS:");
    println!("    --url <URL>             JSON-RPC endpoint (or ${})", cmd_balances::URL_ENV);
    println!("    --address <ADDR>        Holder address, repeatable  [required]");
    println!("    --token <ADDR>          ERC20 token, repeatable");
    println!("    --native                Include native balances alongside tokens");
    println!("    --block <BLOCK>         Block number (hex) or tag, repeatable [default: latest]");
    println!("    --multicall [ADDR]      One aggregated call per block [default: Multicall3]");
    println!("    --retry <N>             Retry failing requests N more times");
    println!("    --concurrency <N>       Max calls in flight (0 = unbounded)");
    println!("    --timeout-ms <MS>       Per-call timeout");
    println!("    --raw                   Print hex balances instead of integers");
    println!("    --json                  Print JSON instead of a tree");
    println!("    --config <FILE>         JSON config file (flags override it)");
    println!("    --log-level <LEVEL>     trace | debug | info | warn | error");
}
