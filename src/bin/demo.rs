//! Command-line demo: run a single request through the detection engine and
//! print the verdict. Wiring mirrors the teacher's `main.rs`
//! (`env_logger` init, `#[tokio::main]`) adapted to a one-shot CLI instead of
//! a long-running server loop.

use clap::Parser;
use log::info;

use warden::{Config, Engine, RequestView};

#[derive(Parser, Debug)]
#[command(about = "Run one request through the bot-detection engine and print the verdict")]
struct Args {
    #[arg(long, default_value = "GET")]
    method: String,

    #[arg(long, default_value = "/")]
    path: String,

    #[arg(long, default_value = "203.0.113.42")]
    ip: String,

    #[arg(long, default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0")]
    user_agent: String,

    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let src = std::fs::read_to_string(path)?;
            Config::from_toml_str(&src)?
        }
        None => Config::default(),
    };

    let engine = Engine::new(config)?;

    let mut req = RequestView::new(&args.method, &args.path, &args.ip);
    req.push_header("host", "example.com");
    req.push_header("user-agent", &args.user_agent);
    req.push_header("accept", "text/html");

    info!("analyzing request {} {} from {}", args.method, args.path, args.ip);
    let result = engine.analyze(&req, &args.ip, None).await;

    println!("correlation_id:  {}", result.correlation_id);
    println!("suspicion_score: {}", result.suspicion_score);
    println!("is_suspicious:   {}", result.is_suspicious);
    println!("confidence:      {:.2}", result.confidence);
    println!("fingerprint:     {}", result.fingerprint);
    println!("reasons:");
    for reason in &result.reasons {
        println!("  [{:?}/{:?}] {} (+{})", reason.category, reason.severity, reason.description, reason.score);
    }

    Ok(())
}
