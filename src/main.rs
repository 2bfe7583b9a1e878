#[tokio::main]
async fn main() -> anyhow::Result<()> {
    webtest_cli::cli::run().await
}
