//! `chainbalance balances`: fetch a balance sheet from a node.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chainbalance_core::{
    AggregateError, BalanceBackend, BalanceRequest, BalanceSheet, Bookkeeper, BookkeeperConfig,
    CancellationToken, MulticallConfig, StrategyConfig, MULTICALL3_ADDRESS,
};
use serde::Deserialize;

use crate::logging::{init_tracing, LogConfig};

/// Environment fallback for `--url`.
pub const URL_ENV: &str = "CHAINBALANCE_RPC_URL";

/// Contents of a `--config` JSON file. Flags override it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub url: Option<String>,
    pub bookkeeper: BookkeeperConfig,
    pub log: LogConfig,
}

#[derive(Debug, Default, PartialEq)]
pub struct BalancesArgs {
    pub url: Option<String>,
    pub addresses: Vec<String>,
    pub tokens: Vec<String>,
    pub native: bool,
    pub blocks: Vec<String>,
    /// `Some` when `--multicall` was given, with its optional address.
    pub multicall: Option<Option<String>>,
    pub retry: Option<u32>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub raw: bool,
    pub json: bool,
    pub config: Option<String>,
    pub log_level: Option<String>,
}

pub fn parse_args(args: &[String]) -> Result<BalancesArgs> {
    let mut parsed = BalancesArgs::default();
    let mut iter = args.iter().peekable();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--url" => parsed.url = Some(take_value(&mut iter, flag)?),
            "--address" => parsed.addresses.push(take_value(&mut iter, flag)?),
            "--token" => parsed.tokens.push(take_value(&mut iter, flag)?),
            "--block" => parsed.blocks.push(take_value(&mut iter, flag)?),
            "--retry" => parsed.retry = Some(parse_number(flag, &take_value(&mut iter, flag)?)?),
            "--concurrency" => {
                parsed.concurrency = Some(parse_number(flag, &take_value(&mut iter, flag)?)?)
            }
            "--timeout-ms" => {
                parsed.timeout_ms = Some(parse_number(flag, &take_value(&mut iter, flag)?)?)
            }
            "--config" => parsed.config = Some(take_value(&mut iter, flag)?),
            "--log-level" => parsed.log_level = Some(take_value(&mut iter, flag)?),
            "--native" => parsed.native = true,
            "--raw" => parsed.raw = true,
            "--json" => parsed.json = true,
            "--multicall" => {
                let address = iter.next_if(|next| !next.starts_with("--")).cloned();
                parsed.multicall = Some(address);
            }
            other => bail!("unknown flag: {other}"),
        }
    }

    if parsed.addresses.is_empty() {
        bail!("at least one --address is required");
    }
    Ok(parsed)
}

fn take_value<'a, I>(iter: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = &'a String>,
{
    iter.next()
        .cloned()
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_number<T>(flag: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("{flag} expects a number, got {raw:?}"))
}

/// One request per (block, address, currency). Native balances are included
/// unless tokens were given without `--native`.
pub fn build_requests(args: &BalancesArgs) -> Vec<BalanceRequest> {
    let latest = ["latest".to_string()];
    let blocks: &[String] = if args.blocks.is_empty() {
        &latest
    } else {
        &args.blocks
    };
    let with_native = args.native || args.tokens.is_empty();

    let mut requests = Vec::new();
    for block in blocks {
        for address in &args.addresses {
            if with_native {
                requests.push(BalanceRequest::native(block.as_str(), address.as_str()));
            }
            for token in &args.tokens {
                requests.push(BalanceRequest::token(
                    block.as_str(),
                    address.as_str(),
                    token.as_str(),
                ));
            }
        }
    }
    requests
}

/// Merge the config file (if any) with flag overrides.
pub fn resolve_config(args: &BalancesArgs, file: FileConfig) -> Result<(String, BookkeeperConfig, LogConfig)> {
    let url = args
        .url
        .clone()
        .or(file.url)
        .or_else(|| std::env::var(URL_ENV).ok())
        .ok_or_else(|| anyhow!("--url is required (or set {URL_ENV})"))?;

    let mut config = file.bookkeeper;
    if let Some(retry) = args.retry {
        config = config.with_retry(retry);
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_call_timeout(Duration::from_millis(ms));
    }
    if let Some(address) = &args.multicall {
        let contract = address.clone().unwrap_or_else(|| MULTICALL3_ADDRESS.to_string());
        config = config.with_strategy(StrategyConfig::Batched(MulticallConfig::new(contract)));
    }

    let mut log = file.log;
    if let Some(level) = &args.log_level {
        log.level = level.clone();
    }
    Ok((url, config, log))
}

fn load_file_config(path: Option<&str>) -> Result<FileConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {path}"))?;
            serde_json::from_str(&content).with_context(|| format!("invalid config {path}"))
        }
        None => Ok(FileConfig::default()),
    }
}

/// Render a sheet as an indented tree, sorted for stable output.
pub fn render_tree<V: Display>(sheet: &BalanceSheet<V>) -> String {
    let mut tree: BTreeMap<&str, BTreeMap<&str, BTreeMap<String, String>>> = BTreeMap::new();
    for (block, address, currency, value) in sheet.iter() {
        tree.entry(block)
            .or_default()
            .entry(address)
            .or_default()
            .insert(currency.to_string(), value.to_string());
    }

    let mut out = String::new();
    for (block, addresses) in tree {
        out.push_str(&format!("block {block}\n"));
        for (address, currencies) in addresses {
            out.push_str(&format!("  {address}\n"));
            for (currency, value) in currencies {
                out.push_str(&format!("    {currency:<42} {value}\n"));
            }
        }
    }
    out
}

fn print_sheet<V: Display>(sheet: BalanceSheet<V>, json: bool) -> Result<()> {
    if json {
        let strings = sheet.map_values(|v| v.to_string());
        println!("{}", serde_json::to_string_pretty(&strings)?);
    } else {
        print!("{}", render_tree(&sheet));
    }
    Ok(())
}

fn report_failures(failures: Option<AggregateError>) {
    if let Some(failures) = failures {
        eprint!("{failures}");
        std::process::exit(1);
    }
}

pub async fn run(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;
    let file = load_file_config(args.config.as_deref())?;
    let (url, config, log) = resolve_config(&args, file)?;
    init_tracing(&log);

    let backend: Arc<dyn BalanceBackend> = Arc::new(
        chainbalance_rpc::connect(url.as_str())
            .with_context(|| format!("failed to create client for {url}"))?,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let bookkeeper = Bookkeeper::with_cancellation_token(backend, config, cancel)?;
    let requests = build_requests(&args);
    tracing::info!(url = %url, requests = requests.len(), "fetching balances");

    if args.raw {
        let report = bookkeeper.raw_sheet(&requests).await?;
        print_sheet(report.balances, args.json)?;
        report_failures(report.failures);
    } else {
        let report = bookkeeper.int_sheet(&requests).await?;
        print_sheet(report.balances, args.json)?;
        report_failures(report.failures);
    }
    Ok(())
}
