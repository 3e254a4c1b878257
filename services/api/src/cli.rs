use clap::{Args, Parser, Subcommand};
use credit_automation::error::AppError;

use crate::demo::{run_demo, run_expiry_sweep, DemoArgs, SweepArgs};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "Credit Automation",
    about = "Run and demonstrate the credit-limit decisioning service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk sample applications through intake, automation and renewal
    Demo(DemoArgs),
    /// Notify risk analysts about credit limits expiring on a given day
    SweepExpiring(SweepArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::SweepExpiring(args) => run_expiry_sweep(args).await,
    }
}
