#[tokio::main]
async fn main() {
    polar_plate::start_server().await;
}
