use tracing_subscriber::EnvFilter;

// single-threaded: a running tool blocks the loop until it exits
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = accountsd_server::Config::from_env();
    accountsd_server::run(cfg).await
}
