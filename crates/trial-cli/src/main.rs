use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use contracts::SessionConfig;
use tokio::sync::watch;
use trial_api::{serve, watch_transcript, EngineApi, StateStore};

fn print_usage() {
    println!("trial-cli <command>");
    println!("commands:");
    println!("  status [state_path]");
    println!("    prints the persisted session status");
    println!("  process <session_id> <transcript> [state_path] [archive_path]");
    println!("    one catch-up pass over the transcript, then exits");
    println!("  watch <session_id> <transcript> [state_path] [archive_path]");
    println!("    polls the transcript until ctrl-c, flushing state on shutdown");
    println!("  exploit <session_id> <transcript> <contradiction_id> [state_path]");
    println!("    marks a recorded contradiction as exploited");
    println!("  replay <session_id> <transcript> <cursor> [state_path] [archive_path]");
    println!("    prints the archived state snapshot at or before the cursor");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
}

fn default_state_path() -> String {
    env::var("SECOND_CHAIR_STATE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "second_chair_state.json".to_string())
}

fn default_archive_path() -> Option<String> {
    env::var("SECOND_CHAIR_ARCHIVE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_path(value: Option<&String>, fallback: String) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or(fallback)
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_u64(value: Option<&String>, label: &str) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

/// SECOND_CHAIR_CONFIG may point at a SessionConfig JSON document; the
/// session id from the command line always wins.
fn load_config(session_id: &str) -> Result<SessionConfig, String> {
    let mut config = match env::var("SECOND_CHAIR_CONFIG")
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("cannot read config {path}: {err}"))?;
            serde_json::from_str::<SessionConfig>(&raw)
                .map_err(|err| format!("cannot parse config {path}: {err}"))?
        }
        None => SessionConfig::default(),
    };
    config.session_id = session_id.to_string();
    Ok(config)
}

fn build_api(args: &[String], attach_archive: bool) -> Result<EngineApi, String> {
    let session_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing session_id".to_string())?;
    let transcript = args
        .get(3)
        .cloned()
        .ok_or_else(|| "missing transcript".to_string())?;
    let state_path = parse_path(args.get(4), default_state_path());
    let archive_path = args
        .get(5)
        .cloned()
        .filter(|path| !path.trim().is_empty())
        .or_else(default_archive_path);

    let config = load_config(&session_id)?;
    let mut api = EngineApi::from_config(config, PathBuf::from(transcript));

    let resumed = api
        .attach_state_store(&state_path)
        .map_err(|err| format!("cannot attach state store: {err}"))?;
    if resumed {
        log::info!("resumed session from {state_path}");
    }

    if attach_archive {
        if let Some(path) = archive_path {
            api.attach_archive(&path)
                .map_err(|err| format!("cannot attach session archive: {err}"))?;
        }
    }

    Ok(api)
}

fn run_status(args: &[String]) -> Result<(), String> {
    let state_path = parse_path(args.get(2), default_state_path());
    let store = StateStore::new(&state_path);
    match store.load().map_err(|err| err.to_string())? {
        Some(state) => {
            println!("{}", state.status());
            Ok(())
        }
        None => Err(format!("no persisted state at {state_path}")),
    }
}

fn run_process(args: &[String]) -> Result<(), String> {
    let mut api = build_api(args, true)?;
    let report = api.ingest_pass().map_err(|err| err.to_string())?;
    api.flush_now().map_err(|err| err.to_string())?;

    for change in &report.changes {
        println!("  {change}");
    }
    println!(
        "processed={} warnings={} {}",
        report.processed, report.stream_warnings, report.status
    );
    Ok(())
}

async fn run_watch(args: &[String]) -> Result<(), String> {
    let mut api = build_api(args, true)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    println!(
        "watching {} (poll every {}ms, ctrl-c to stop)",
        api.transcript_path().display(),
        api.config().poll_interval_ms
    );
    watch_transcript(&mut api, shutdown_rx)
        .await
        .map_err(|err| err.to_string())?;
    println!("flushed: {}", api.status());
    Ok(())
}

fn run_exploit(args: &[String]) -> Result<(), String> {
    let contradiction_id = args
        .get(4)
        .cloned()
        .ok_or_else(|| "missing contradiction_id".to_string())?;
    // Drop the contradiction id so the state path lands in the slot
    // build_api expects.
    let mut layout = args[..4.min(args.len())].to_vec();
    if let Some(state_path) = args.get(5) {
        layout.push(state_path.clone());
    }

    let mut api = build_api(&layout, false)?;
    let found = api
        .mark_contradiction_exploited(&contradiction_id)
        .map_err(|err| err.to_string())?;
    if !found {
        return Err(format!("unknown contradiction_id: {contradiction_id}"));
    }
    println!("marked {contradiction_id} exploited");
    Ok(())
}

fn run_replay(args: &[String]) -> Result<(), String> {
    let cursor = parse_u64(args.get(4), "cursor")?;
    // Drop the cursor argument so state/archive paths land in the slots
    // build_api expects.
    let mut layout = args[..4.min(args.len())].to_vec();
    layout.extend(args.iter().skip(5).cloned());

    let api = build_api(&layout, true)?;

    match api.replay_at(cursor).map_err(|err| err.to_string())? {
        Some(state) => {
            println!("{}", state.status());
            Ok(())
        }
        None => Err(format!("no archived snapshot at or before cursor {cursor}")),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("status") => run_status(&args),
        Some("process") => run_process(&args),
        Some("watch") => run_watch(&args).await,
        Some("exploit") => run_exploit(&args),
        Some("replay") => run_replay(&args),
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                serve(addr).await.map_err(|err| err.to_string())
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        _ => {
            print_usage();
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
