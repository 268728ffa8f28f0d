//! chainwatch CLI — watch transactions and addresses from the terminal.
//!
//! Usage:
//! ```bash
//! # Watch a transaction until you interrupt
//! chainwatch tx --url wss://api.example.com/v0 --key <dapp-id> --hash 0xabc...
//!
//! # Watch every transaction touching an address
//! chainwatch account --url wss://api.example.com/v0 --key <dapp-id> --address 0xdef...
//! ```

use std::env;
use std::process;

use chainwatch_client::WatchClient;
use chainwatch_core::{
    ClientConfig, CloseInfo, ConnectionListener, System, TransactionState, TxIdentifier,
    WatchError,
};
use chainwatch_ws::{WsSocket, WsSocketConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "tx" => cmd_watch(&args[2..], Target::Transaction).await,
        "account" => cmd_watch(&args[2..], Target::Account).await,
        "version" | "--version" | "-V" => {
            println!("chainwatch {}", env!("CARGO_PKG_VERSION"));
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
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainwatch {}", env!("CARGO_PKG_VERSION"));
    println!("Watch blockchain transactions and addresses from the terminal\n");
    println!("USAGE:");
    println!("    chainwatch <COMMAND>\n");
    println!("COMMANDS:");
    println!("    tx         Watch a single transaction");
    println!("    account    Watch every transaction touching an address");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("COMMON FLAGS:");
    println!("    --url <URL>          WebSocket endpoint  [required]");
    println!("    --key <DAPP_ID>      API key  [required]");
    println!("    --system <SYSTEM>    ethereum | bitcoin  [default: ethereum]");
    println!("    --network <ID>       Network id  [default: 1]\n");
    println!("TX FLAGS:");
    println!("    --hash <HASH>        Transaction hash (ethereum)");
    println!("    --txid <TXID>        Transaction id (bitcoin)\n");
    println!("ACCOUNT FLAGS:");
    println!("    --address <ADDRESS>  Address to watch");
}

enum Target {
    Transaction,
    Account,
}

struct PrintLifecycle;

impl ConnectionListener for PrintLifecycle {
    fn on_open(&self) {
        eprintln!("connected");
    }
    fn on_down(&self, info: &CloseInfo) {
        eprintln!("connection lost ({}); reconnecting", info.reason);
    }
    fn on_reopen(&self) {
        eprintln!("reconnected");
    }
    fn on_close(&self) {
        eprintln!("connection closed");
    }
}

async fn cmd_watch(args: &[String], target: Target) -> Result<(), String> {
    let url = parse_flag(args, "--url").ok_or("--url is required")?;
    let key = parse_flag(args, "--key").ok_or("--key is required")?;
    let system = match parse_flag(args, "--system").as_deref() {
        None | Some("ethereum") => System::Ethereum,
        Some("bitcoin") => System::Bitcoin,
        Some(other) => return Err(format!("unknown system: {other}")),
    };
    let network = parse_flag(args, "--network")
        .map(|n| n.parse::<u64>().map_err(|_| format!("bad network id: {n}")))
        .transpose()?
        .unwrap_or(1);

    let config = ClientConfig::new(key, system, network);
    let (socket, events) = WsSocket::connect(url, WsSocketConfig::default());

    let client = WatchClient::builder(config)
        .connection_listener(PrintLifecycle)
        .error_sink(|e: WatchError| eprintln!("server error: {e}"))
        .transaction_handler(|state: &TransactionState, _| {
            let line = serde_json::to_string(state).unwrap_or_default();
            println!("{line}");
        })
        .connect(socket, events);

    let print_state = |_: &TransactionState| -> Option<serde_json::Value> { None };

    match target {
        Target::Transaction => {
            let identifier = match (parse_flag(args, "--hash"), parse_flag(args, "--txid")) {
                (Some(hash), None) => TxIdentifier::Hash(hash),
                (None, Some(txid)) => TxIdentifier::Id(txid),
                _ => return Err("exactly one of --hash / --txid is required".into()),
            };
            client
                .watch_transaction(identifier, print_state)
                .map_err(|e| e.to_string())?;
        }
        Target::Account => {
            let address = parse_flag(args, "--address").ok_or("--address is required")?;
            client
                .watch_account(&address, print_state)
                .map_err(|e| e.to_string())?;
        }
    }

    eprintln!("watching — press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
    client.destroy();

    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
