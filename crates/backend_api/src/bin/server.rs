use backend_api::run_server;
use settings_loader::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment variables (with a .env fallback), read once
    let settings = Settings::load()?;

    println!("In-office presence server");
    println!("=========================");
    println!("Listening on: {}:{}", settings.host, settings.port);
    println!("Timezone: {}", settings.timezone);
    println!("Freshness: {:?}", settings.freshness);
    println!(
        "Notifications: {}",
        if settings.notify_webhook_url.is_some() { "enabled" } else { "disabled" }
    );
    println!();

    run_server(settings).await?;

    Ok(())
}
