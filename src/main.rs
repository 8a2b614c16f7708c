use anyhow::Result;
use arxivbuddy_rs::cli::{self, Args};
use arxivbuddy_rs::generator::workflow::launch;
use clap::Parser;
use tracing::error;

/// 初始化日志：RUST_LOG 优先，日志写到 stderr，stdout 只留给结果文档
fn init_tracing(args: &Args, verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        "arxivbuddy_rs=debug"
    } else {
        "arxivbuddy_rs=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if args.log_json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ 配置加载失败: {:#}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&args, config.verbose);

    if let Err(e) = config.validate() {
        error!("❌ 配置错误: {}", e);
        std::process::exit(1);
    }

    let options = cli::run_options(&config);
    let outcome = match launch(&config, &args.query, options, args.skip_connection_check).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("❌ 启动失败: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("{}", outcome.output);
    if let Some(path) = &outcome.saved_path {
        println!("💾 {}", path.display());
    }
    if !outcome.succeeded {
        std::process::exit(1);
    }
    Ok(())
}
