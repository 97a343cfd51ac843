use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "lunch-bot")]
#[command(about = "Query the cafeteria lunch menu and manage bento orders")]
pub struct CliConfig {
    /// Path to TOML configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the menu JSON file
    #[arg(long)]
    pub menu_file: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show the menu for a date ("明日", "2026-02-09", "来週の月曜" ...)
    Menu { date: String },
    /// Search dishes by keyword, or look up a date
    Search { query: String },
    /// List every known menu day
    List,
    /// Place an order
    Order {
        date: String,
        menu_type: String,
        #[arg(short, long, default_value = "1")]
        quantity: u32,
    },
    /// Cancel an order
    Cancel { date: String, menu_type: String },
    /// Show orders for a day, a month ("今月", "2月") or everything upcoming ("今後")
    Status { range: String },
}

impl Command {
    pub fn needs_ordering(&self) -> bool {
        matches!(
            self,
            Command::Order { .. } | Command::Cancel { .. } | Command::Status { .. }
        )
    }
}
