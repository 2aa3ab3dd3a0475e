use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::blocking::{multipart, Client, RequestBuilder};
use serde_json::Value;
use spacedrop::config;
use std::{
    io::{self, Read},
    path::PathBuf,
    time::Duration,
};

/// dropctl: configure and exercise a running Spacedrop host.
///
/// Sends the same multipart requests a phone shortcut would, which makes it
/// handy for checking policy and confirmation settings from another machine.
#[derive(Debug, Parser)]
#[command(name = "dropctl")]
#[command(version)]
struct Cli {
    /// Base URL of the Spacedrop host
    #[arg(long, env = "SPACEDROP_URL", default_value = "http://127.0.0.1:8787")]
    url: String,

    /// Seconds to wait for a response (covers the confirmation dialog)
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print or validate configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },

    /// GET /health
    Health,

    /// GET /debug/whoami
    Whoami,

    /// POST /admin/reload-config
    Reload,

    /// Drop a local file via /drop
    SendFile {
        /// Path to file
        path: PathBuf,

        /// Filename reported to the host (default: the local file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Drop text (argument, or stdin when omitted) via /drop
    SendText { text: Option<String> },

    /// Replace the desktop clipboard with text (argument, or stdin when omitted)
    ClipText { text: Option<String> },

    /// Replace the desktop clipboard with an image file
    ClipImage { path: PathBuf },
}

#[derive(Debug, Subcommand)]
enum ConfigCmd {
    /// Print a config example to stdout
    Example,

    /// Validate a config file (loads and parses TOML)
    Validate {
        #[arg(long)]
        path: PathBuf,
    },
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn text_or_stdin(text: Option<String>) -> Result<String> {
    match text {
        Some(t) => Ok(t),
        None => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("read stdin")?;
            Ok(s)
        }
    }
}

/// Send the request, print the JSON body, and fail on a non-2xx status.
fn send(req: RequestBuilder, u: &str) -> Result<()> {
    let resp = req.send().with_context(|| format!("request {u}"))?;
    let status = resp.status();
    let txt = resp.text().context("read response")?;
    match serde_json::from_str::<Value>(&txt) {
        Ok(v) => println!(
            "{}",
            serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string())
        ),
        Err(_) => println!("{txt}"),
    }
    if !status.is_success() {
        anyhow::bail!("request failed: {status}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()
        .context("build http client")?;

    match cli.cmd {
        Cmd::Config { cmd } => match cmd {
            ConfigCmd::Example => {
                let ex = include_str!("../../config.example.toml");
                print!("{ex}");
            }
            ConfigCmd::Validate { path } => {
                let _ = config::Config::load(&path).with_context(|| format!("load {path:?}"))?;
                eprintln!("OK: {path:?}");
            }
        },

        Cmd::Health => {
            let u = endpoint(&cli.url, "/health");
            send(client.get(&u), &u)?;
        }

        Cmd::Whoami => {
            let u = endpoint(&cli.url, "/debug/whoami");
            send(client.get(&u), &u)?;
        }

        Cmd::Reload => {
            let u = endpoint(&cli.url, "/admin/reload-config");
            send(client.post(&u), &u)?;
        }

        Cmd::SendFile { path, name } => {
            let bytes = std::fs::read(&path).with_context(|| format!("read {path:?}"))?;
            let name = name
                .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "untitled".to_string());
            let form = multipart::Form::new()
                .part("file", multipart::Part::bytes(bytes).file_name(name));
            let u = endpoint(&cli.url, "/drop");
            send(client.post(&u).multipart(form), &u)?;
        }

        Cmd::SendText { text } => {
            let form = multipart::Form::new().text("text", text_or_stdin(text)?);
            let u = endpoint(&cli.url, "/drop");
            send(client.post(&u).multipart(form), &u)?;
        }

        Cmd::ClipText { text } => {
            let form = multipart::Form::new()
                .text("kind", "text")
                .text("text", text_or_stdin(text)?);
            let u = endpoint(&cli.url, "/clip/push");
            send(client.post(&u).multipart(form), &u)?;
        }

        Cmd::ClipImage { path } => {
            let form = multipart::Form::new()
                .text("kind", "image")
                .file("image", &path)
                .with_context(|| format!("read {path:?}"))?;
            let u = endpoint(&cli.url, "/clip/push");
            send(client.post(&u).multipart(form), &u)?;
        }
    }

    Ok(())
}
