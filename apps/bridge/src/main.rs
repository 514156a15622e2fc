#[tokio::main]
async fn main() -> anyhow::Result<()> {
    deckbridge::run().await
}
