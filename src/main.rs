use anyhow::Result;
use clap::{Parser, Subcommand};
use ledmon::config::Config;
use ledmon::daemon;

#[derive(Parser)]
#[command(
    name = "ledmon",
    version,
    about = "LED traffic monitor daemon",
    long_about = "Monitors network interface byte counters and blinks a board status LED\n\
                  faster as traffic rises. Each started instance detaches into the\n\
                  background, claims one of the two controllable leds (lan, power) and\n\
                  owns exactly one interface."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring an interface and drive the status led
    Start {
        #[arg(value_name = "INTERFACE")]
        interface: String,
    },
    /// Stop one instance, or every instance when no interface is given
    Stop {
        #[arg(value_name = "INTERFACE")]
        interface: Option<String>,
    },
    /// Show the run state of one or all instances
    Status {
        #[arg(value_name = "INTERFACE")]
        interface: Option<String>,
    },
    /// List interfaces currently claimed by a running instance
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let cfg = Config::load_or_default();

    match cli.command {
        Commands::Start { interface } => daemon::start(&cfg, &interface),
        Commands::Stop {
            interface: Some(interface),
        } => daemon::stop(&cfg, &interface),
        Commands::Stop { interface: None } => daemon::stop_all(&cfg),
        Commands::Status {
            interface: Some(interface),
        } => daemon::status(&cfg, &interface),
        Commands::Status { interface: None } => daemon::status_all(&cfg),
        Commands::List => daemon::list(&cfg),
    }
}
