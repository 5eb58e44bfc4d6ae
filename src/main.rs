//! Airlift agent - airgap mirror admission webhook

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use airlift::webhook::{start_agent_server, AgentState};
use airlift::{DEFAULT_AGENT_PORT, DEFAULT_STATE_PATH};

/// Airlift - airgap mirror admission agent
#[derive(Parser, Debug)]
#[command(name = "airlift", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the in-cluster admission agent (default mode)
    ///
    /// Serves the mutating admission webhook that rewrites git repository
    /// URLs and container images to the cluster-local mirror. The mirror
    /// coordinates are read from the mounted state file on every request.
    Agent(AgentArgs),
}

/// Agent mode arguments
#[derive(Parser, Debug)]
struct AgentArgs {
    /// Port the webhook server listens on
    #[arg(long, default_value_t = DEFAULT_AGENT_PORT)]
    port: u16,

    /// Path of the mounted mirror state file
    #[arg(long, env = "AIRLIFT_STATE_PATH", default_value = DEFAULT_STATE_PATH)]
    state_path: PathBuf,
}

impl Default for AgentArgs {
    fn default() -> Self {
        Self {
            port: DEFAULT_AGENT_PORT,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let args = match cli.command {
        Some(Commands::Agent(args)) => args,
        None => AgentArgs::default(),
    };

    let state = Arc::new(AgentState::new(args.state_path));
    start_agent_server(args.port, state).await;
    Ok(())
}
