use clap::Parser;
use goatherd::cli::{
    default_config, run_mdns_query, run_query, run_responder, Cli, Commands,
};
use goatherd::config::{setup_logging, ConfigFile};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let cli = Cli::parse();

    // no config file is fine for the query tools, the defaults work
    let config = match cli.sopt().and_then(|sopt| sopt.config.as_ref()) {
        Some(path) => ConfigFile::try_from_path(Some(path))?,
        None => ConfigFile::try_from_path(None).unwrap_or_default(),
    };

    let debug = cli.sopt().map(|sopt| sopt.debug).unwrap_or(false);
    let _logger = setup_logging(&config, debug)?;
    log::debug!("running with config: {config}");

    match cli.command {
        Commands::Query {
            name,
            rrtype,
            nameserver,
            ..
        } => run_query(&config, &name, &rrtype, nameserver).await?,
        Commands::MdnsQuery {
            name,
            rrtype,
            wait_seconds,
            ..
        } => run_mdns_query(&config, &name, &rrtype, wait_seconds).await?,
        Commands::Respond {
            service,
            port,
            instance,
            ..
        } => run_responder(&config, &service, port, instance).await?,
        Commands::ConfigCheck { .. } => match config.check_config() {
            Ok(()) => println!("Config looks fine: {config}"),
            Err(errors) => {
                for error in errors {
                    eprintln!("{error}");
                }
                return Err(std::io::Error::other("config check failed"));
            }
        },
        Commands::ExportConfig {} => default_config(),
    };
    Ok(())
}
