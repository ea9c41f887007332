#[tokio::main]
async fn main() -> anyhow::Result<()> {
    address_validator::run().await
}
