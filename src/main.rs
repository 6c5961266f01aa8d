// ===============================
// src/main.rs
// ===============================
/*
 cd hl_loop_rust

 # order 1 HYPE @ 10 tanpa benar-benar submit
 cargo run -- --dry-run limit --coin HYPE --side buy --price 10 --size 1

 # pantau saldo, mark price, health factor
 cargo run -- watch --coin HYPE
 curl -s localhost:9898/metrics | egrep '^(withdrawable_usdc|mark_price|lending_health_factor)'
*/
/*
=============================================================================
Project : hl_loop_rust — Hyperliquid order signing + Morpho leverage loop in Rust
Module  : main.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : CLI entry: limit/market/cancel orders, builder fee approval,
          open orders, account watch, health factor, supply+borrow,
          wallet balances, CoreWriter IOC / builder approval.
=============================================================================
*/
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ethers::types::Address;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hl_loop_rust::automation::{Automation, AutomationSettings};
use hl_loop_rust::config::{self, Args, Network};
use hl_loop_rust::corewriter::{CoreWriterClient, HyperEvmWriter, IocParams};
use hl_loop_rust::domain::{Event, OrderRef, Side, Tif};
use hl_loop_rust::gateway::{DryRunTransport, HttpTransport, Transport};
use hl_loop_rust::info::InfoClient;
use hl_loop_rust::morpho::{self, LendingActions, MorphoClient, PositionSource, SupplyBorrowOutcome};
use hl_loop_rust::order::Cloid;
use hl_loop_rust::poller::{watch_account, WatchIntervals};
use hl_loop_rust::recorder::{self, Journal};
use hl_loop_rust::trader::{LimitOrder, Trader};
use hl_loop_rust::wallet::{KeyWallet, PromptWallet, WalletProvider};
use hl_loop_rust::{metrics, Error, Result};

#[derive(Parser, Debug)]
#[command(name = "hl_loop", about = "Hyperliquid orders + Morpho wstETH/USDC loop")]
struct Cli {
    /// mainnet | testnet (default: NETWORK env, lalu mainnet)
    #[arg(long, value_parser = parse_network)]
    network: Option<Network>,

    /// Sign but never submit to /exchange
    #[arg(long)]
    dry_run: bool,

    /// Ask on the terminal before every signature
    #[arg(long)]
    confirm: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place a limit order
    Limit {
        #[arg(long)]
        coin: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        price: String,
        #[arg(long)]
        size: String,
        #[arg(long, default_value = "Gtc", value_parser = parse_tif)]
        tif: Tif,
        #[arg(long)]
        reduce_only: bool,
        /// Attach a client order id (random if "auto")
        #[arg(long)]
        cloid: Option<String>,
    },
    /// IOC order at mark price ± slippage
    Market {
        #[arg(long)]
        coin: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        size: String,
        #[arg(long)]
        slippage_bps: Option<u32>,
    },
    /// Cancel by exchange order id or client order id
    Cancel {
        #[arg(long)]
        coin: String,
        #[arg(long, conflicts_with = "cloid", required_unless_present = "cloid")]
        oid: Option<u64>,
        #[arg(long)]
        cloid: Option<String>,
    },
    /// EIP-712 approval for a builder fee
    ApproveBuilder {
        #[arg(long)]
        builder: Option<String>,
        #[arg(long)]
        max_fee_rate: Option<String>,
    },
    OpenOrders {
        #[arg(long)]
        user: Option<String>,
    },
    /// Poll balance, mark price and lending position until Ctrl-C
    Watch {
        #[arg(long, default_value = "HYPE")]
        coin: String,
        #[arg(long)]
        user: Option<String>,
        /// Skip the Morpho position poller
        #[arg(long)]
        no_lending: bool,
    },
    /// Morpho position and health factor
    Health {
        #[arg(long)]
        user: Option<String>,
    },
    /// Supply wstETH collateral then borrow USDC
    SupplyBorrow {
        #[arg(long)]
        collateral: String,
        #[arg(long)]
        borrow: String,
    },
    Repay {
        #[arg(long)]
        amount: String,
    },
    /// wstETH and USDC in the wallet
    Balances {
        #[arg(long)]
        user: Option<String>,
    },
    /// IOC order through the CoreWriter helper on HyperEVM (E8 integers)
    CoreIoc {
        #[arg(long)]
        asset: u32,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        price: String,
        #[arg(long)]
        size: String,
        #[arg(long)]
        reduce_only: bool,
    },
    /// Builder fee approval through the CoreWriter helper (max 10000 deci-bps)
    CoreApproveBuilder {
        #[arg(long)]
        builder: Option<String>,
        #[arg(long)]
        max_fee_deci_bps: u64,
    },
}

fn parse_network(s: &str) -> std::result::Result<Network, String> {
    Network::parse(s).ok_or_else(|| format!("unknown network '{s}' (mainnet|testnet)"))
}

fn parse_side(s: &str) -> std::result::Result<Side, String> {
    Side::parse(s).ok_or_else(|| format!("unknown side '{s}' (buy|sell)"))
}

fn parse_tif(s: &str) -> std::result::Result<Tif, String> {
    Tif::parse(s).ok_or_else(|| format!("unknown tif '{s}' (Gtc|Ioc|Alo)"))
}

fn parse_address(s: &str) -> Result<Address> {
    s.trim().parse().map_err(|e| Error::Config(format!("address {s}: {e}")))
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    // ---- Load config (.env + env), CLI override ----
    let _ = dotenvy::dotenv();
    let mut args = match cli.network {
        Some(n) => config::load_with(n),
        None => config::load(),
    };
    args.dry_run |= cli.dry_run;
    args.confirm_sign |= cli.confirm;
    info!(config = ?args.redacted(), "config loaded");

    metrics::init();

    match run(cli.cmd, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::UserRejected) => {
            warn!("cancelled: signature declined");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Reads go to the venue; writes too unless dry-run.
fn transport(args: &Args) -> Result<Arc<dyn Transport>> {
    let http = HttpTransport::new(&args.net.api_url)?;
    if args.dry_run {
        info!("dry-run: /exchange calls are intercepted");
        Ok(Arc::new(DryRunTransport::new(http)))
    } else {
        Ok(Arc::new(http))
    }
}

fn key_wallet(args: &Args) -> Result<KeyWallet> {
    let key = args
        .private_key
        .as_deref()
        .ok_or_else(|| Error::Config("PRIVATE_KEY is not set".into()))?;
    KeyWallet::from_private_key(key, args.net.wallet_chain_id)
}

fn wallet(args: &Args) -> Result<Arc<dyn WalletProvider>> {
    let key = key_wallet(args)?;
    if args.confirm_sign {
        Ok(Arc::new(PromptWallet::new(key)))
    } else {
        Ok(Arc::new(key))
    }
}

/// --user, else the address of PRIVATE_KEY.
fn user_address(args: &Args, user: Option<String>) -> Result<Address> {
    match user {
        Some(u) => parse_address(&u),
        None => Ok(key_wallet(args)?.address()),
    }
}

/// Journal + writer task; disabled journal when RECORD_FILE is unset.
async fn journal(args: &Args) -> Result<(Journal, Option<tokio::task::JoinHandle<()>>)> {
    match &args.record_file {
        Some(path) => {
            let (j, task) = recorder::start(path.clone()).await?;
            Ok((j, Some(task)))
        }
        None => Ok((Journal::disabled(), None)),
    }
}

fn read_lending(args: &Args) -> Result<MorphoClient<morpho::ReadClient>> {
    MorphoClient::connect_http(
        &args.eth_rpc_url,
        args.net.morpho.clone(),
        args.wsteth_oracle_price,
        args.eth_price_fallback,
    )
}

fn core_writer(args: &Args) -> Result<CoreWriterClient<HyperEvmWriter>> {
    let key = key_wallet(args)?;
    CoreWriterClient::connect_signer(
        &args.net.hyper_evm_rpc,
        key.local().clone(),
        &args.net.core_writer,
        args.net.network.hyper_evm_chain_id(),
    )
}

/// dry-run: cetak calldata saja, tidak ada tx.
fn print_dry_run(args: &Args, calldata: &[u8]) -> bool {
    if args.dry_run {
        println!("to {}\ndata 0x{}", args.net.core_writer, hex::encode(calldata));
    }
    args.dry_run
}

fn write_lending(args: &Args) -> Result<MorphoClient<morpho::WriteClient>> {
    let key = key_wallet(args)?;
    MorphoClient::connect_signer(
        &args.eth_rpc_url,
        key.local().clone(),
        args.net.morpho.clone(),
        args.wsteth_oracle_price,
        args.eth_price_fallback,
    )
}

async fn run(cmd: Command, args: Args) -> Result<()> {
    match cmd {
        Command::Limit { coin, side, price, size, tif, reduce_only, cloid } => {
            let cloid = match cloid.as_deref() {
                None => None,
                Some("auto") => Some(Cloid::random()),
                Some(c) => Some(Cloid::parse(c)?),
            };
            let req = LimitOrder { coin, is_buy: side.is_buy(), price, size, reduce_only, tif, cloid };
            with_trader(&args, |t| async move {
                let resp = t.place_limit_order(&req).await?;
                println!("{}", serde_json::to_string_pretty(&resp)?);
                Ok(())
            })
            .await
        }
        Command::Market { coin, side, size, slippage_bps } => {
            let bps = slippage_bps.unwrap_or(args.slippage_bps);
            with_trader(&args, |t| async move {
                let resp = t.place_market_order(&coin, side.is_buy(), &size, bps).await?;
                println!("{}", serde_json::to_string_pretty(&resp)?);
                Ok(())
            })
            .await
        }
        Command::Cancel { coin, oid, cloid } => {
            let target = match (oid, cloid) {
                (Some(oid), _) => OrderRef::Oid(oid),
                (None, Some(c)) => OrderRef::Cloid(Cloid::parse(&c)?.0),
                (None, None) => return Err(Error::InvalidOrderParameters("--oid or --cloid required".into())),
            };
            with_trader(&args, |t| async move {
                let resp = t.cancel(&coin, target).await?;
                println!("{}", serde_json::to_string_pretty(&resp)?);
                Ok(())
            })
            .await
        }
        Command::ApproveBuilder { builder, max_fee_rate } => {
            let builder = builder
                .or_else(|| args.builder_address.clone())
                .ok_or_else(|| Error::Config("--builder or BUILDER_ADDRESS required".into()))?;
            let builder = parse_address(&builder)?;
            let rate = max_fee_rate.unwrap_or_else(|| args.max_fee_rate.clone());
            with_trader(&args, |t| async move {
                let resp = t.approve_builder_fee(&builder, &rate).await?;
                println!("{}", serde_json::to_string_pretty(&resp)?);
                Ok(())
            })
            .await
        }
        Command::OpenOrders { user } => {
            let user = user_address(&args, user)?;
            let info = InfoClient::new(transport(&args)?, args.fallback_asset_index);
            let orders = info.open_orders(user).await?;
            if orders.is_empty() {
                println!("no open orders");
            }
            for o in orders {
                println!("{:>12} {:<8} {:<4} px={} sz={}", o.oid, o.coin, o.side, o.limit_px, o.sz);
            }
            Ok(())
        }
        Command::Watch { coin, user, no_lending } => watch(&args, coin, user, no_lending).await,
        Command::Health { user } => {
            let user = user_address(&args, user)?;
            let m = read_lending(&args)?.position_metrics(user).await?;
            println!("{}", serde_json::to_string_pretty(&m)?);
            if m.is_liquidatable() {
                warn!(health_factor = m.health_factor, "position is liquidatable");
            }
            Ok(())
        }
        Command::SupplyBorrow { collateral, borrow } => {
            let lending = write_lending(&args)?;
            // satu proses = satu aksi: FSM di sini hanya melacak state, debounce-nya
            // baru berarti untuk pemakai library yang hidup lama
            let mut auto = Automation::new(AutomationSettings { auto_borrow: true, auto_trade: false });
            let outcome = auto
                .run("supply_borrow", morpho::supply_then_borrow(&lending, &collateral, &borrow))
                .await?;
            match outcome {
                SupplyBorrowOutcome::Both { supply_tx, borrow_tx } => {
                    println!("supply {supply_tx}\nborrow {borrow_tx}");
                    Ok(())
                }
                SupplyBorrowOutcome::SupplyOnly { supply_tx, borrow_error } => {
                    println!("supply {supply_tx}\nborrow FAILED: {borrow_error}");
                    Err(borrow_error)
                }
            }
        }
        Command::Repay { amount } => {
            let tx = write_lending(&args)?.repay(&amount).await?;
            println!("repay {tx}");
            Ok(())
        }
        Command::Balances { user } => {
            let user = user_address(&args, user)?;
            let b = read_lending(&args)?.wallet_balances(user).await?;
            println!("{}", serde_json::to_string_pretty(&b)?);
            Ok(())
        }
        Command::CoreIoc { asset, side, price, size, reduce_only } => {
            let params = IocParams::new(asset, side.is_buy(), &price, &size, reduce_only)?;
            let cw = core_writer(&args)?;
            if print_dry_run(&args, &cw.ioc_calldata(&params)?) {
                return Ok(());
            }
            cw.ensure_chain(args.net.network.hyper_evm_chain_id()).await?;
            println!("tx {}", cw.place_ioc(&params).await?);
            Ok(())
        }
        Command::CoreApproveBuilder { builder, max_fee_deci_bps } => {
            let builder = builder
                .or_else(|| args.builder_address.clone())
                .ok_or_else(|| Error::Config("--builder or BUILDER_ADDRESS required".into()))?;
            let builder = parse_address(&builder)?;
            let cw = core_writer(&args)?;
            if print_dry_run(&args, &cw.builder_fee_calldata(builder, max_fee_deci_bps)?) {
                return Ok(());
            }
            cw.ensure_chain(args.net.network.hyper_evm_chain_id()).await?;
            println!("tx {}", cw.approve_builder_fee(builder, max_fee_deci_bps).await?);
            Ok(())
        }
    }
}

/// Builds the trader (+ optional journal), runs `f`, then lets the recorder flush.
async fn with_trader<F, Fut>(args: &Args, f: F) -> Result<()>
where
    F: FnOnce(Arc<Trader<Arc<dyn WalletProvider>, dyn Transport>>) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let (j, writer) = journal(args).await?;
    let trader = Arc::new(Trader::new(
        wallet(args)?,
        args.net.network,
        transport(args)?,
        args.fallback_asset_index,
        j,
    ));
    info!(address = %format!("{:#x}", trader.address()), network = ?args.net.network, "trader ready");

    let result = f(trader).await;
    if let Some(task) = writer {
        // semua Journal sudah di-drop, writer flush lalu selesai
        let _ = task.await;
    }
    result
}

async fn watch(args: &Args, coin: String, user: Option<String>, no_lending: bool) -> Result<()> {
    metrics::serve_metrics(args.metrics_port)?;
    let (j, writer) = journal(args).await?;

    let user = user_address(args, user)?;
    let info = Arc::new(InfoClient::new(transport(args)?, args.fallback_asset_index));
    let lending: Option<Arc<dyn PositionSource>> = if no_lending {
        None
    } else {
        match read_lending(args) {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                warn!(error = %e, "lending reads disabled");
                None
            }
        }
    };

    let every = WatchIntervals { market: args.poll_interval, position: args.position_poll_interval };
    let mut w = watch_account(info, lending, user, &coin, every);
    j.note(format!("watch started for {coin}"));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, stopping pollers");
                break;
            }
            snap = w.next_snapshot() => match snap {
                Some(s) => {
                    let hf = s.position.as_ref().map(|p| p.health_factor);
                    info!(withdrawable = s.withdrawable, mark = s.mark_price, health_factor = ?hf, "account");
                    j.record(Event::Snapshot(s));
                }
                None => break,
            },
        }
    }

    w.stop().await;
    drop(j);
    if let Some(task) = writer {
        let _ = task.await;
    }
    Ok(())
}
