#[tokio::main]
async fn main() {
    aventon::start_server().await;
}
