#[tokio::main]
async fn main() {
    reconciler::run::start(std::env::args()).await;
}
