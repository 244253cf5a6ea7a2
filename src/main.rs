//! Entry point for the harvest binary.

use pdfharvest::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (the store URL may live there).
    let _ = dotenvy::dotenv();

    cli::run().await
}
