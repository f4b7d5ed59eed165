use mitsuki::config::ConfigStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    mitsuki::init_tracing();

    let config = ConfigStore::load()?;
    let app = demo_app::build_app(config).await?;
    app.run().await?;

    Ok(())
}
