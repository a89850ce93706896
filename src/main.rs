mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codecraft-analytics")]
#[command(about = "Inspect and exercise the session analytics pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print configuration, store location and connection state
    Status(commands::status::StatusArgs),
    /// Record one interaction, optionally amending its token count
    Record(commands::record::RecordArgs),
    /// Resolve the identity behind ANALYTICS_ACCESS_TOKEN
    Whoami,
}

fn main() {
    codecraft_analytics::observability::init_tracing();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Status(args) => commands::status::handle_status(&args),
        Command::Record(args) => commands::record::handle_record(&args),
        Command::Whoami => commands::whoami::handle_whoami(),
    };
    std::process::exit(code);
}
