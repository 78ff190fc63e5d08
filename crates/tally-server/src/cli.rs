use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tally-server", about = "Poll and vote tallying server")]
pub struct Args {
    /// Path to the TOML config file. A missing file means built-in defaults.
    #[arg(short, long, default_value = "tally.toml")]
    pub config: String,

    /// Override `server.bind_address`.
    #[arg(long)]
    pub bind: Option<String>,
}
