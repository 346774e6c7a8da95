use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "billing-bus")]
#[command(about = "Boots the billing modules on the service bus and runs a sample request flow")]
pub struct CliArgs {
    #[arg(long, short = 'c', help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}
