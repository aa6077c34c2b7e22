use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    ideal_cli::run().await
}
