use std::net::SocketAddr;

use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:3000".parse()?;
    let mut config = lessonload_testserver::TestServerConfig::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:3000")
                })?;
                bind_addr = addr.parse()?;
            }
            "--token" => {
                config.token = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--token requires a value"))?;
            }
            "-h" | "--help" => {
                eprintln!(
                    "lessonload-testserver\n\nUSAGE:\n  lessonload-testserver [--bind 127.0.0.1:3000] [--token tok-1]\n\nOUTPUT:\n  Prints HTTP_URL=<url> to stdout once ready."
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

    let stats = lessonload_testserver::TestServerStats::default();
    let app = lessonload_testserver::router(config, stats.clone());

    println!("HTTP_URL=http://{addr}");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;

    eprintln!(
        "served {} requests ({} lessons created)",
        stats.requests_total(),
        stats.lessons_created()
    );
    Ok(())
}
