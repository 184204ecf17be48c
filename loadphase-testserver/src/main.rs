use std::net::SocketAddr;

use loadphase_testserver::{CouponConfig, TestServerStats};
use tokio::net::TcpListener;
use tokio::time::Duration;

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:8080".parse()?;
    let mut config = CouponConfig::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => bind_addr = next_value(&mut args, "--bind")?.parse()?,
            "--limit" => config.limit = next_value(&mut args, "--limit")?.parse()?,
            "--delay-ms" => {
                config.delay = Duration::from_millis(next_value(&mut args, "--delay-ms")?.parse()?);
            }
            "--fail-every" => {
                config.fail_every = next_value(&mut args, "--fail-every")?.parse()?;
            }
            "-h" | "--help" => {
                eprintln!(
                    "loadphase-testserver\n\nUSAGE:\n  loadphase-testserver [--bind 127.0.0.1:8080] [--limit 100] [--delay-ms 0] [--fail-every 0]\n\nOUTPUT:\n  Prints HTTP_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = loadphase_testserver::router(config, TestServerStats::default());

    println!("HTTP_URL=http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
