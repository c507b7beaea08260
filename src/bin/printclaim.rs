use clap::Parser;
use log::{error, info, LevelFilter};
use printclaim::app::{run, Cli};
use printclaim::error::{AppRunError, ConfigError};
use printclaim::init_logging;

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();
    init_logging(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info })?;
    info!(concat!("printclaim ", env!("CARGO_PKG_VERSION")));

    match run(cli).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another instance is already using the printer");
            Ok(())
        },
        Err(err) => {
            error!("{}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
