#[tokio::main]
async fn main() {
    if let Err(err) = voyager::runner::run().await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}
