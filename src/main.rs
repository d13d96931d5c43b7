use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    quota_reserve::cli::app::run().await
}
