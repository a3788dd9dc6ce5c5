use notesyncd::daemon::{DaemonConfig, DaemonRuntime};
use notesyncd::logging;
use notesyncd::storage::TokenStorage;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Once,
    Logout,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CliArgs {
    mode: CliMode,
    full: bool,
}

fn parse_cli_args<I>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs {
        mode: CliMode::Run,
        full: false,
    };
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--once" => parsed.mode = CliMode::Once,
            "--full" => parsed.full = true,
            "--logout" => parsed.mode = CliMode::Logout,
            "--help" | "-h" => parsed.mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init().map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))?;

    let args = parse_cli_args(std::env::args())?;
    match args.mode {
        CliMode::Logout => {
            TokenStorage::new()?.delete_token()?;
            info!("saved token removed");
            return Ok(());
        }
        CliMode::Help => {
            println!("Usage: notesyncd [--once] [--full] [--logout]");
            println!("  --once     Run a single sync cycle and exit");
            println!("  --full     Start with a full sync instead of an incremental one");
            println!("  --logout   Remove the saved access token and exit");
            return Ok(());
        }
        CliMode::Run | CliMode::Once => {}
    }

    let config = DaemonConfig::from_env()?;
    let daemon = DaemonRuntime::bootstrap(config).await?;
    if args.mode == CliMode::Once {
        return daemon.run_once(args.full).await;
    }
    daemon.run(args.full).await
}
