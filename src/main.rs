use sqlmorph::cli::{Cli, Commands};
use sqlmorph::commands;
use sqlmorph::config::MorphConfig;
use sqlmorph::error::format_error_chain;
use sqlmorph::log_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = sqlmorph::logging::init(cli.verbose) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            log_error!(e);
            sqlmorph::logging::output::error(format_error_chain(&e));
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> sqlmorph::Result<()> {
    let config_file = MorphConfig::load_from_file()?;

    match cli.command {
        Commands::Init => commands::execute_init(),
        Commands::Plan {
            connection_string,
            dialect,
            schema_file,
            output,
        } => {
            let config =
                MorphConfig::merge_with_cli(config_file, connection_string, dialect, schema_file);
            let result = commands::execute_plan(&config, output.as_deref()).await?;
            commands::print_plan_summary(&result);
            Ok(())
        }
        Commands::Apply {
            connection_string,
            dialect,
            schema_file,
            lock_timeout,
        } => {
            let mut config =
                MorphConfig::merge_with_cli(config_file, connection_string, dialect, schema_file);
            if lock_timeout.is_some() {
                config.lock_timeout_seconds = lock_timeout;
            }
            let result = commands::execute_apply(&config).await?;
            commands::print_apply_summary(&result);
            Ok(())
        }
    }
}
