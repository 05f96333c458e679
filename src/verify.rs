//! Checks that a deployment has everything the server needs before it starts.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use void_z1::bootstrap::verify_setup;
use void_z1::infrastructure::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "void_z1=warn".into()),
        )
        .init();

    println!("=== Void Z1 Setup Verification ===");
    let config = AppConfig::from_env()?;
    let issues = verify_setup(&config).await;

    if issues.is_empty() {
        println!("[OK] All setup checks passed.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("[ERROR] Setup verification failed:");
    for issue in &issues {
        println!(" - {issue}");
    }
    Ok(ExitCode::FAILURE)
}
