//! `netinsight` — Net-Insight-Monitor operator command-line interface.
//!
//! Works directly on the server's SQLite database file:
//!
//! - **`issue-key`**: create (or re-key) the Profile for a hostname and print
//!   the new API key.
//! - **`profiles`**: list every Profile.
//! - **`agents`**: list the Agents registered under one Profile.
//! - **`export`**: write a Profile's sample history as CSV to stdout.
//!
//! and against a running server:
//!
//! - **`submit`**: post a metrics JSON file, as an agent would.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use netinsight::escape_html;
use netinsight_api::{StatusResponse, API_KEY_HEADER};
use netinsight_server::{export::render_csv, generate_api_key, SqliteStorage, Storage};

/// netinsight — Net-Insight-Monitor operator CLI
#[derive(Parser)]
#[command(name = "netinsight", version, about, long_about = None)]
struct Cli {
    /// Path to the server's SQLite database.
    #[arg(long, env = "NETINSIGHT_DB", global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a fresh API key for a hostname.
    ///
    /// Creates the Profile if the hostname has never reported, otherwise
    /// replaces its key. The old key stops working immediately for any
    /// request that is checked against this Profile.
    IssueKey {
        /// The agent hostname the key is issued for.
        hostname: String,
    },

    /// List all Profiles.
    Profiles {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List the Agents registered under a Profile.
    Agents {
        /// Profile id, as shown by `netinsight profiles`.
        profile_id: i64,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Export a Profile's samples as CSV to stdout.
    Export {
        /// Profile id, as shown by `netinsight profiles`.
        profile_id: i64,
    },

    /// Post a metrics submission to a running server.
    ///
    /// Pass `-` as FILE to read from stdin.
    Submit {
        /// Path to a JSON file, or `-` for stdin.
        file: PathBuf,

        /// Base URL of the server.
        #[arg(long, env = "NETINSIGHT_URL", default_value = "http://127.0.0.1:8080")]
        url: String,

        /// API key sent in the X-API-KEY header.
        #[arg(long, env = "NETINSIGHT_API_KEY")]
        key: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::IssueKey { hostname } => {
            let hostname = hostname.trim();
            if hostname.is_empty() {
                fatal("hostname must not be empty");
            }
            let storage = open_storage(cli.db);
            let key = generate_api_key();
            // Stored hostnames are escaped on ingestion; match that form.
            let profile = block_on(storage.issue_key(&escape_html(hostname), &key))
                .unwrap_or_else(|e| fatal(&format!("failed to issue key: {e}")));
            eprintln!("profile {} ({})", profile.id, profile.agent_name);
            println!("{key}");
        }

        Command::Profiles { json } => {
            let storage = open_storage(cli.db);
            let profiles = block_on(storage.list_profiles())
                .unwrap_or_else(|e| fatal(&format!("failed to list profiles: {e}")));
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&profiles)
                        .unwrap_or_else(|e| fatal(&e.to_string()))
                );
            } else {
                println!("ID\tNAME\tTYPE\tACTIVE\tLAST HEARD FROM");
                for p in profiles {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        p.id,
                        p.agent_name,
                        p.agent_type,
                        if p.is_active { "yes" } else { "no" },
                        p.last_heard_from.as_deref().unwrap_or("-"),
                    );
                }
            }
        }

        Command::Agents { profile_id, json } => {
            let storage = open_storage(cli.db);
            require_profile(&storage, profile_id);
            let agents = block_on(storage.list_agents(profile_id))
                .unwrap_or_else(|e| fatal(&format!("failed to list agents: {e}")));
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&agents)
                        .unwrap_or_else(|e| fatal(&e.to_string()))
                );
            } else {
                println!("ID\tHOSTNAME\tSOURCE IP\tTYPE\tFIRST SEEN\tLAST SEEN");
                for a in agents {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        a.id,
                        a.agent_hostname,
                        a.agent_source_ip,
                        a.agent_type,
                        a.first_seen,
                        a.last_seen,
                    );
                }
            }
        }

        Command::Export { profile_id } => {
            let storage = open_storage(cli.db);
            require_profile(&storage, profile_id);
            let table = block_on(storage.export_samples(profile_id))
                .unwrap_or_else(|e| fatal(&format!("failed to read samples: {e}")));
            io::stdout()
                .write_all(render_csv(&table).as_bytes())
                .unwrap_or_else(|e| fatal(&format!("failed to write output: {e}")));
        }

        Command::Submit { file, url, key } => {
            let body = read_input(&file);
            if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
                fatal(&format!("input is not JSON: {e}"));
            }
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|e| fatal(&format!("failed to build HTTP client: {e}")));
            let resp = client
                .post(format!("{}/v1/metrics", url.trim_end_matches('/')))
                .header(API_KEY_HEADER, key)
                .header("content-type", "application/json")
                .body(body)
                .send()
                .unwrap_or_else(|e| fatal(&format!("request failed: {e}")));

            let status = resp.status();
            match resp.json::<StatusResponse>() {
                Ok(r) => println!("{} {}", status.as_u16(), r.message),
                Err(_) => println!("{}", status.as_u16()),
            }
            if !status.is_success() {
                process::exit(1);
            }
        }
    }
}

fn open_storage(db: Option<PathBuf>) -> SqliteStorage {
    let path = db.unwrap_or_else(|| fatal("no database given; pass --db or set NETINSIGHT_DB"));
    SqliteStorage::open(&path, Duration::from_secs(5))
        .unwrap_or_else(|e| fatal(&format!("failed to open {}: {e}", path.display())))
}

/// Exit unless a Profile with `profile_id` exists.
fn require_profile(storage: &SqliteStorage, profile_id: i64) {
    if block_on(storage.get_profile(profile_id))
        .unwrap_or_else(|e| fatal(&e.to_string()))
        .is_none()
    {
        fatal(&format!("no profile with id {profile_id}"));
    }
}

/// Drive one storage call to completion on a throwaway runtime.
fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fatal(&format!("failed to start runtime: {e}")))
        .block_on(fut)
}

/// Read the full contents of a file, or stdin when the path is `"-"`.
fn read_input(path: &PathBuf) -> String {
    if path.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {}", e)));
        buf
    } else {
        fs::read_to_string(path).unwrap_or_else(|e| {
            fatal(&format!("failed to read {}: {}", path.display(), e))
        })
    }
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("netinsight: {}", msg);
    process::exit(2);
}
