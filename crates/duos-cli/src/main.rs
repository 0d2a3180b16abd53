use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "duos-cli", version, about = "Duos partner rotation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Member roster management
    Member {
        #[command(subcommand)]
        action: commands::member::MemberAction,
    },
    /// Pairing overrides and queries
    Pair {
        #[command(subcommand)]
        action: commands::pair::PairAction,
    },
    /// Reshuffle runs and scheduling
    Rotate {
        #[command(subcommand)]
        action: commands::rotate::RotateAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Member { action } => commands::member::run(action),
        Commands::Pair { action } => commands::pair::run(action),
        Commands::Rotate { action } => commands::rotate::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
