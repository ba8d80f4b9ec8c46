//! `medium`: drive the product chaincode against a local private-data ledger.
//!
//! ```text
//! medium invoke createProduct p1 Widget Red 10 5 2.50 4.99
//! medium query getProductPrice p1
//! medium serve < requests.jsonl
//! ```
//!
//! `serve` protocol, one JSON object per line:
//!   request  `{ "id": "..", "kind": "invoke"|"query"|"init", "function": "..", "args": [..] }`
//!   response `{ "id": "..", "ok": bool, "result"?: {..}, "error"?: { "code", "message" } }`

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use medium_chaincode::{
    contracts::MediumChaincode,
    ledger::{Collections, FileLedger, PrivateDataLedger},
    peer::{Invocation, InvocationKind, Peer, ProposalResponse},
};

#[derive(Parser)]
#[command(name = "medium", version, about = "Private-data product chaincode on a local peer")]
struct Cli {
    /// Ledger snapshot file.
    #[arg(long, env = "MEDIUM_STATE", default_value = "medium-state.json", global = true)]
    state: PathBuf,

    /// Identity mixed into transaction ids.
    #[arg(long, env = "MEDIUM_CREATOR", default_value = "medium-cli", global = true)]
    creator: String,

    /// Defined private data collection (repeatable). Defaults to
    /// collectionMedium and collectionPrivate.
    #[arg(long = "collection", value_name = "NAME", global = true)]
    collections: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Instantiate the chaincode.
    Init {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a function and commit its writes on success.
    Invoke {
        function: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a function without committing anything.
    Query {
        function: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Answer JSON-line requests from stdin until EOF.
    Serve,
}

type MediumPeer = Peer<FileLedger, MediumChaincode>;

// =============================================================================
// Serve protocol
// =============================================================================

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: String,
    #[serde(default)]
    kind: InvocationKind,
    function: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Reply {
    id: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ProposalResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl Reply {
    fn from_proposal(id: String, result: ProposalResponse) -> Self {
        Self {
            id,
            ok: result.is_ok(),
            result: Some(result),
            error: None,
        }
    }

    fn err(id: String, code: &str, message: String) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ErrorDetail {
                code: code.to_string(),
                message,
            }),
        }
    }
}

fn handle_line(peer: &mut MediumPeer, line: &str) -> Reply {
    let req: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return Reply::err(
                String::new(),
                "PARSE_ERROR",
                format!("Invalid JSON request: {e}"),
            )
        }
    };
    tracing::debug!(op = "serve.dispatch", id = %req.id, function = %req.function, "Dispatching");

    let invocation = Invocation::new(req.kind, &req.function, req.args);
    match peer.execute(invocation) {
        Ok(result) => Reply::from_proposal(req.id, result),
        Err(e) => Reply::err(req.id, "LEDGER_ERROR", e.to_string()),
    }
}

fn serve(peer: &mut MediumPeer) -> anyhow::Result<()> {
    tracing::info!(op = "serve.startup", "Serving JSON-line requests on stdin");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line.context("read request from stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reply = handle_line(peer, trimmed);
        serde_json::to_writer(&mut out, &reply).context("write reply")?;
        out.write_all(b"\n").context("write reply")?;
        out.flush().context("flush stdout")?;
    }

    tracing::info!(op = "serve.shutdown", "stdin closed");
    Ok(())
}

fn run_once(peer: &mut MediumPeer, invocation: Invocation) -> anyhow::Result<ExitCode> {
    let result = peer.execute(invocation).context("commit to ledger")?;
    if result.is_ok() {
        let mut out = io::stdout().lock();
        out.write_all(&result.response.payload)?;
        if !result.response.payload.is_empty() {
            out.write_all(b"\n")?;
        }
        tracing::info!(tx_id = %result.tx_id, committed = result.committed, "ok");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("error: {}", result.response.message);
        Ok(ExitCode::FAILURE)
    }
}

fn main() -> anyhow::Result<ExitCode> {
    // stdout is reserved for payloads and serve replies
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("medium_chaincode=info,medium=info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let collections = if cli.collections.is_empty() {
        Collections::default()
    } else {
        Collections::new(cli.collections)
    };
    let ledger = FileLedger::open(&cli.state, collections)
        .with_context(|| format!("open ledger {}", cli.state.display()))?;
    tracing::debug!(
        op = "ledger.ready",
        path = %ledger.path().display(),
        height = ledger.height(),
        collections = ?ledger.collections().iter().collect::<Vec<_>>(),
        "Ledger ready"
    );
    let mut peer = Peer::new(ledger, MediumChaincode::new(), cli.creator);

    match cli.command {
        Command::Init { args } => {
            run_once(&mut peer, Invocation::new(InvocationKind::Init, "init", args))
        }
        Command::Invoke { function, args } => {
            run_once(&mut peer, Invocation::invoke(&function, args))
        }
        Command::Query { function, args } => {
            run_once(&mut peer, Invocation::query(&function, args))
        }
        Command::Serve => serve(&mut peer).map(|()| ExitCode::SUCCESS),
    }
}
