//! Vault5 - Terminal Deposit Client
//!
//! Drives the deposit workflow against the Vault5 payments backend.
//!
//! Run modes:
//!   cargo run                                        - Show usage
//!   cargo run -- accounts                            - List deposit targets
//!   cargo run -- deposit --amount 500 --provider mpesa --phone 2547...
//!   cargo run -- status <intent-id>                  - One-off status check
//!   cargo run -- device-id                           - Print the device id
//!   cargo run -- login --token <token> | logout      - Manage the session

use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;

use vault5::api::DepositGateway;
use vault5::common::{init_from_config, log_error, Result, Vault5Config, Vault5Error};
use vault5::deposit::{DepositWorkflow, WorkflowSnapshot, WorkflowState};
use vault5::{ApiClient, AuthEvent, Provider, Session, SqliteKeyValueStore};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let config = match Vault5Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let result = match args[1].as_str() {
        "accounts" => run_accounts(&config).await,
        "deposit" => run_deposit(&config, &args[2..]).await,
        "status" => run_status(&config, &args[2..]).await,
        "device-id" => run_device_id(&config),
        "login" => run_login(&config, &args[2..]),
        "logout" => run_logout(&config),
        "config" => {
            config.print_summary();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        log_error(e.error_code(), &e.to_string());
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Vault5 - Deposit Client");
    println!();
    println!("Usage:");
    println!("  vault5 accounts                               List deposit targets");
    println!("  vault5 deposit --amount <n> --provider <p>    Start a deposit");
    println!("         [--target <wallet|account-id>] [--phone <msisdn>] [--yes]");
    println!("  vault5 status <intent-id>                     Check a payment intent");
    println!("  vault5 device-id                              Print this device's id");
    println!("  vault5 login --token <token>                  Store a bearer token");
    println!("  vault5 logout                                 Remove the stored token");
    println!("  vault5 config                                 Show configuration");
    println!();
    println!("Providers: mpesa, airtel, bank");
    println!();
    println!("Environment Variables:");
    println!("  VAULT5_ENV            development | production");
    println!("  VAULT5_API_URL        Backend base URL override");
    println!("  VAULT5_PUBLIC_ORIGIN  Backend origin used in production");
    println!("  VAULT5_STORE_PATH     SQLite session store");
    println!("  VAULT5_LOG_LEVEL      trace | debug | info | warn | error");
}

fn open_session(config: &Vault5Config) -> Result<Session> {
    let store = SqliteKeyValueStore::new(&config.store_path)?;
    Ok(Session::new(Arc::new(store)))
}

fn open_client(config: &Vault5Config) -> Result<ApiClient> {
    let session = open_session(config)?;
    watch_auth_events(&session);
    Ok(ApiClient::new(config.client_config(), session)?)
}

/// Tell the user when the backend rejects the stored token
fn watch_auth_events(session: &Session) {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::LoginRequired) => {
                    eprintln!("Session expired. Run `vault5 login --token <token>` to sign in again.");
                }
                Ok(AuthEvent::SignedOut) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn run_accounts(config: &Vault5Config) -> Result<()> {
    let client = open_client(config)?;
    let accounts = client.list_accounts().await?;

    println!("=== Deposit Targets ===");
    println!("  {:<26} Wallet", "wallet");
    for account in &accounts {
        let balance = account
            .balance
            .map(|b| format!("{} {}", account.currency.as_deref().unwrap_or(""), b))
            .unwrap_or_default();
        println!("  {:<26} {:<24} {}", account.id, account.display_name(), balance.trim());
    }
    Ok(())
}

async fn run_status(config: &Vault5Config, args: &[String]) -> Result<()> {
    let intent_id = args
        .first()
        .ok_or_else(|| Vault5Error::workflow("usage: vault5 status <intent-id>"))?;
    let client = open_client(config)?;
    let status = client.transaction_status(intent_id).await?;
    println!("{}: {}", intent_id, status);
    Ok(())
}

fn run_device_id(config: &Vault5Config) -> Result<()> {
    let session = open_session(config)?;
    println!("{}", session.device_id());
    Ok(())
}

fn run_login(config: &Vault5Config, args: &[String]) -> Result<()> {
    let mut token = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--token" if i + 1 < args.len() => {
                token = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Vault5Error::workflow("usage: vault5 login --token <token>"))?;

    let session = open_session(config)?;
    session.set_token(token.trim())?;
    println!("Token stored for device {}", session.device_id());
    Ok(())
}

fn run_logout(config: &Vault5Config) -> Result<()> {
    let session = open_session(config)?;
    session.sign_out();
    println!("Signed out");
    Ok(())
}

#[derive(Debug, Default)]
struct DepositArgs {
    amount: String,
    provider: Option<Provider>,
    target: Option<String>,
    phone: String,
    yes: bool,
}

fn parse_deposit_args(args: &[String]) -> Result<DepositArgs> {
    let mut parsed = DepositArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--amount" if i + 1 < args.len() => {
                parsed.amount = args[i + 1].clone();
                i += 2;
            }
            "--provider" if i + 1 < args.len() => {
                let provider = args[i + 1]
                    .parse::<Provider>()
                    .map_err(Vault5Error::workflow)?;
                parsed.provider = Some(provider);
                i += 2;
            }
            "--target" if i + 1 < args.len() => {
                parsed.target = Some(args[i + 1].clone());
                i += 2;
            }
            "--phone" if i + 1 < args.len() => {
                parsed.phone = args[i + 1].clone();
                i += 2;
            }
            "--yes" | "-y" => {
                parsed.yes = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(parsed)
}

async fn run_deposit(config: &Vault5Config, args: &[String]) -> Result<()> {
    let parsed = parse_deposit_args(args)?;
    let client = open_client(config)?;

    let mut workflow = DepositWorkflow::new(Arc::new(client), config.workflow_config())
        .with_success_callback(|| println!("Balances will refresh on your next `vault5 accounts`."));

    // Account names only improve the summary
    if let Err(e) = workflow.load_accounts().await {
        tracing::warn!(target: "vault5::cli", error = %e, "could not load accounts");
    }

    workflow.edit_form(|form| {
        form.amount = parsed.amount.clone();
        form.provider = parsed.provider;
        if let Some(target) = &parsed.target {
            form.target = target.clone();
        }
        form.phone = parsed.phone.clone();
    })?;

    if let Err(e) = workflow.submit() {
        for (field, message) in workflow.field_errors().iter() {
            eprintln!("  {}: {}", field, message);
        }
        return Err(e);
    }

    println!("=== Confirm Deposit ===");
    if let Some(summary) = workflow.summary() {
        print!("{}", summary);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    if !parsed.yes {
        println!("Confirm & Start? [y/N]");
        let answer = stdin.next_line().await?.unwrap_or_default();
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            workflow.close();
            println!("Cancelled");
            return Ok(());
        }
    }

    if workflow.confirm().await? == WorkflowState::Error {
        print_snapshot(&workflow.snapshot());
        return Err(Vault5Error::workflow("deposit was not started"));
    }

    let outcome = follow_deposit(&mut workflow, &mut stdin).await?;
    match outcome.state {
        WorkflowState::Success => {
            workflow.done()?;
            Ok(())
        }
        _ => Err(Vault5Error::workflow(
            outcome.error.unwrap_or_else(|| "deposit failed".to_string()),
        )),
    }
}

/// Print state changes until an outcome; `c` + Enter confirms manually,
/// `q` + Enter or Ctrl+C abandons the dialog.
async fn follow_deposit(
    workflow: &mut DepositWorkflow,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<WorkflowSnapshot> {
    let mut rx = workflow.subscribe();
    print_snapshot(&rx.borrow_and_update());
    println!("Press `c` + Enter once you've paid, `q` + Enter to stop waiting.");

    let mut stdin_open = true;
    loop {
        let current = rx.borrow().clone();
        if current.state.is_outcome() {
            return Ok(current);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Err(Vault5Error::workflow("workflow closed"));
                }
                print_snapshot(&rx.borrow_and_update());
            }
            line = stdin.next_line(), if stdin_open => match line? {
                Some(input) if input.trim() == "c" => {
                    workflow.manual_confirm().await?;
                    print_snapshot(&rx.borrow_and_update());
                }
                Some(input) if input.trim() == "q" => {
                    workflow.close();
                    return Err(Vault5Error::workflow("stopped waiting for the deposit"));
                }
                Some(_) => {}
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                workflow.close();
                return Err(Vault5Error::workflow("interrupted"));
            }
        }
    }
}

fn print_snapshot(snapshot: &WorkflowSnapshot) {
    let mut line = format!("[{}]", snapshot.state);
    if let Some(id) = &snapshot.intent_id {
        line.push_str(&format!(" intent={}", id));
    }
    if let Some(status) = snapshot.intent_status {
        line.push_str(&format!(" status={}", status));
    }
    if let Some(message) = &snapshot.message {
        line.push_str(&format!(" {}", message));
    }
    println!("{}", line);
    if let Some(error) = &snapshot.error {
        println!("  ! {}", error);
    }
}
