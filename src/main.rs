#[tokio::main]
async fn main() {
    if let Err(error) = daybook_agent::run().await {
        eprintln!("daybook-agent failed: {error}");
        std::process::exit(1);
    }
}
