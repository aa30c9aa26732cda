#[tokio::main]
async fn main() -> pvegate::Result<()> {
    pvegate::init_tracing();
    tracing::info!("pvegate starting");
    pvegate::run().await
}
