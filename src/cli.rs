use clap::{Parser, Subcommand};

/// Mayfly — self-destructing, schema-driven micro-APIs
#[derive(Parser)]
#[command(name = "mayfly", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server
    Serve {
        /// Port to bind (overrides MAYFLY_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect and manage provisioned services
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// List recently created services
    List {
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Destroy a service now, through the same path as the cleanup job
    Destroy {
        #[arg(long)]
        id: i64,
    },
}
