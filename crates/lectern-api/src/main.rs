use lectern_api::setup;
use lectern_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Database, gateway, services, sweeper and routes
    let (_state, router, sweeper) = setup::initialize_app(config.clone()).await?;

    setup::server::start_server(&config, router, sweeper).await?;

    Ok(())
}
