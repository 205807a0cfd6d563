use crate::demo::{run_demo, DemoArgs};
use crate::server;
use agora::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Agora",
    about = "Run the Agora polling service and its maintenance tasks from the command line",
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
    /// Apply the database schema to DATABASE_URL and exit
    Migrate,
    /// Walk through creating a poll, voting, and reading results on an in-memory store
    Demo(DemoArgs),
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
        Command::Migrate => server::migrate().await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_without_subcommand() {
        let cli = Cli::try_parse_from(["agora"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from(["agora", "serve", "--host", "0.0.0.0", "--port", "8080"])
            .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(8080));
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn parses_demo_flags() {
        let cli = Cli::try_parse_from(["agora", "demo", "--json", "--csv"]).expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => assert!(args.json && args.csv),
            other => panic!("expected demo command, got {other:?}"),
        }
    }
}
