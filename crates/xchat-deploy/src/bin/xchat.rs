/// The xchat operations CLI. It deploys hubs and spokes, lists the current
/// deployment, and sends and inspects chat messages:
///
/// - `xchat deploy hub <chainId>`
/// - `xchat deploy spoke <chainId>`
/// - `xchat info`
/// - `xchat spoke <chainId> getMessages [count]`
/// - `xchat spoke <chainId> sendMessage <text> [valueWei]`
/// - `xchat spoke <chainId> register`
/// - `xchat spoke <chainId> status <txHash>`
/// - `xchat spoke <chainId> resend <txHash> [valueWei]`
/// - `xchat hub state`
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use xchat_deploy::{
    backend::EthersBackend,
    commands::{run, Cli},
    env::{Environment, Overrides},
    logging::init_logging,
};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    // Load the environment.
    let env = match Environment::init(Overrides::default()) {
        Ok(env) => env,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    // Run the command.
    let backend = EthersBackend::new(env.clone());
    let mut stdout = std::io::stdout();
    match run(cli.command, &env, &backend, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
