/// This script deploys a hub on the first configured chain and a spoke on
/// every configured chain, registering each spoke with the hub. The result is
/// written to `output/<env>/deployHubAndSpokes/lastrun.json`.
use eyre::Result;
use tracing::info;
use xchat_deploy::{
    backend::EthersBackend,
    deploy::deploy_hub_and_spokes,
    env::{Environment, Overrides},
    logging::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    // Load the environment.
    let env = Environment::init(Overrides::default())?;
    info!(env = env.name(), "deploying hub and spokes");

    // Deploy the contracts.
    let backend = EthersBackend::new(env.clone());
    let output = deploy_hub_and_spokes(&env, &backend).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
