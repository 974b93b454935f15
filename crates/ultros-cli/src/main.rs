//! Ultros command-line launcher.
//!
//! # Usage
//!
//! ```bash
//! ultros init                      # write ./config/ultros.toml and an example network
//! ultros start                     # connect and run until Ctrl+C
//! ultros --config /etc/ultros --data /var/lib/ultros start
//! ```
//!
//! Settings in `ultros.toml` can be overridden with `ULTROS_*` environment
//! variables, e.g. `ULTROS_LOGGING__LEVEL=debug`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ultros::irc::IrcNetwork;
use ultros::runtime::{DEFAULT_CONFIG_DIR, DEFAULT_DATA_DIR, Ultros};

const DEFAULT_CONFIG: &str = r#"# Ultros configuration.

[logging]
level = "info"
format = "compact"

# One entry per network. Each network is configured in
# networks/<name>.toml, falling back to networks/<name>.toml.default.
[[networks]]
name = "example"
enabled = false
"#;

const EXAMPLE_NETWORK: &str = r##"# Copy to example.toml and edit, then enable the network in ultros.toml.
type = "irc"
host = "irc.libera.chat"
port = 6667
# tls = true and port = 6697 need the `tls` feature.
tls = false
nickname = "Ultros"
username = "ultros"
realname = "Ultros"
channels = ["#ultros"]
"##;

/// Ultros - a pluggable chat bot
#[derive(Parser, Debug)]
#[command(name = "ultros")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config directory
    #[arg(long = "config", value_name = "DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Data directory
    #[arg(long = "data", value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Create the config and data directories with example files
    Init,
    /// Connect to the configured networks and run until interrupted
    Start,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Init => init(&args.config_dir, &args.data_dir),
        Command::Start => start(&args.config_dir, &args.data_dir),
    }
}

fn init(config_dir: &Path, data_dir: &Path) -> Result<()> {
    let networks_dir = config_dir.join("networks");
    fs::create_dir_all(&networks_dir)
        .with_context(|| format!("failed to create {}", networks_dir.display()))?;
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    write_if_absent(&config_dir.join("ultros.toml"), DEFAULT_CONFIG)?;
    write_if_absent(&networks_dir.join("example.toml.default"), EXAMPLE_NETWORK)?;
    Ok(())
}

/// Writes `contents` unless the file exists. Returns whether it was written.
fn write_if_absent(path: &Path, contents: &str) -> Result<bool> {
    if path.exists() {
        println!("Keeping {}", path.display());
        return Ok(false);
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(true)
}

fn start(config_dir: &Path, data_dir: &Path) -> Result<()> {
    let ultros = Ultros::builder()
        .config_dir(config_dir)
        .data_dir(data_dir)
        .build()
        .context("failed to initialize Ultros")?;
    ultros.register_network_type::<IrcNetwork>();
    ultros.run().context("Ultros stopped with an error")?;
    Ok(())
}
