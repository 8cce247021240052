// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Flowform CLI entrypoint.
//!
//! Every command reads whole documents and writes whole documents; logs go to stderr so the
//! document or JSON output on stdout stays clean. Set `RUST_LOG` to override `-v`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flowform::config::ConfigError;
use flowform::form::{EditSession, FormState};
use flowform::format::codec::{compress_with_level, CodecError, Document};
use flowform::model::{GraphModel, Node};
use flowform::query::FlowView;
use flowform::store::{parse_document_id, DocumentFolder, StoreError, WriteDurability};
use flowform::{EngineConfig, SaveRequest, SyncEngine, SyncError};

/// Keep draw.io process diagrams and a structured step form in sync.
#[derive(Parser, Debug)]
#[command(name = "flowform", version)]
struct Cli {
    /// Engine configuration (JSON). Defaults apply to missing fields.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sync written files and their directory to stable storage.
    #[arg(long, global = true)]
    durable_writes: bool,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the decoded graph body of a document.
    Decode { file: PathBuf },
    /// Wrap a literal graph body in a compressed single-page document.
    Encode {
        file: PathBuf,
        /// Print only the compressed payload.
        #[arg(long)]
        raw: bool,
    },
    /// Print the graph model and the main flow with its branches as JSON.
    Inspect { file: PathBuf },
    /// Print the merged form nodes as JSON.
    Form {
        file: PathBuf,
        /// Saved form state (JSON) with user-authored sub-steps.
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,
    },
    /// Apply edited form nodes to a document.
    Patch {
        file: PathBuf,
        /// Edited nodes (JSON array).
        #[arg(long, value_name = "FILE")]
        nodes: PathBuf,
        /// The document the form was built from, when it differs from FILE.
        #[arg(long, value_name = "FILE")]
        base: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Generate a document from a graph model.
    Rebuild {
        /// Graph model (JSON).
        #[arg(long, value_name = "FILE")]
        graph: PathBuf,
        /// Document whose envelope is kept.
        #[arg(long, value_name = "FILE")]
        previous: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Apply edited form nodes to a stored document and keep them as its form state.
    Save {
        dir: PathBuf,
        id: String,
        #[arg(long, value_name = "FILE")]
        nodes: PathBuf,
        #[arg(long, value_name = "FILE")]
        base: Option<PathBuf>,
    },
    /// List the documents in a folder.
    List { dir: PathBuf },
    /// Print the JSON schema of the form payload.
    Schema,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write output: {0}")]
    Stdout(#[source] io::Error),
    #[error("cannot serialize output: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn read_text(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn emit(text: &str, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => fs::write(path, text).map_err(|source| CliError::Write {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes()).map_err(CliError::Stdout)?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n").map_err(CliError::Stdout)?;
            }
            Ok(())
        }
    }
}

fn emit_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(CliError::Serialize)?;
    emit(&json, None)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let level = config.codec.compression_level;
    let engine = SyncEngine::new(config);
    let durability = if cli.durable_writes {
        WriteDurability::Durable
    } else {
        WriteDurability::Fast
    };

    match cli.command {
        Command::Decode { file } => {
            let document = Document::parse_with_level(&read_text(&file)?, level)?;
            emit(document.body(), None)
        }
        Command::Encode { file, raw } => {
            let body = read_text(&file)?;
            if raw {
                emit(&compress_with_level(&body, level)?, None)
            } else {
                emit(&Document::new_compressed(&body, level)?.to_text(), None)
            }
        }
        Command::Inspect { file } => {
            let loaded = engine.load(&read_text(&file)?)?;
            emit_json(&serde_json::json!({
                "graph": loaded.graph,
                "flow": loaded.view(),
                "orphans": loaded.analysis.orphans(),
            }))
        }
        Command::Form { file, state } => {
            let loaded = engine.load(&read_text(&file)?)?;
            let state: FormState = match state {
                Some(path) => read_json(&path)?,
                None => FormState::default(),
            };
            emit_json(&engine.form(&loaded, &state, &EditSession::new()))
        }
        Command::Patch {
            file,
            nodes,
            base,
            output,
        } => {
            let request = SaveRequest {
                base_text: base.as_deref().map(read_text).transpose()?,
                latest_text: read_text(&file)?,
                nodes: read_json::<Vec<Node>>(&nodes)?,
            };
            let outcome = engine.save(&request)?;
            if let Some(reason) = &outcome.recovered {
                error!(reason = %reason, "patch discarded; document left unchanged");
            }
            let report = serde_json::to_string(&outcome.report).unwrap_or_default();
            info!(report = %report, "patch report");
            emit(&outcome.text, output.as_deref())
        }
        Command::Rebuild {
            graph,
            previous,
            output,
        } => {
            let graph: GraphModel = read_json(&graph)?;
            let previous = previous.as_deref().map(read_text).transpose()?;
            let outcome = engine.rebuild(previous.as_deref(), &graph)?;
            emit(&outcome.text, output.as_deref())
        }
        Command::Save {
            dir,
            id,
            nodes,
            base,
        } => {
            let folder = DocumentFolder::new(dir).with_durability(durability);
            let id = parse_document_id(&id)?;
            let request = SaveRequest {
                base_text: base.as_deref().map(read_text).transpose()?,
                latest_text: folder.read_document(&id)?,
                nodes: read_json::<Vec<Node>>(&nodes)?,
            };
            let outcome = engine.save(&request)?;
            if outcome.changed() {
                folder.write_document(&id, &outcome.text)?;
            }
            folder.write_form_state(&id, &FormState::new(outcome.nodes.clone()))?;
            info!(document_id = %id, changed = outcome.changed(), "saved");
            emit_json(&outcome.report)
        }
        Command::List { dir } => {
            let ids = DocumentFolder::new(dir).list()?;
            let listing: Vec<String> = ids.iter().map(ToString::to_string).collect();
            emit(&listing.join("\n"), None)
        }
        Command::Schema => emit_json(&serde_json::json!({
            "nodes": schemars::schema_for!(Vec<Node>),
            "formState": schemars::schema_for!(FormState),
            "flowView": schemars::schema_for!(FlowView),
            "graph": schemars::schema_for!(GraphModel),
        })),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "flowform failed");
            ExitCode::FAILURE
        }
    }
}
