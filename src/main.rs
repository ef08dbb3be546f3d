use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    docgate::cli::app::run().await
}
