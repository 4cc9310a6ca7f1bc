use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Inspection CLI for the relay gateway publish endpoint", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-user ports, active sessions and subscription state
    Status,
    /// Print a user's published subscription document
    Fetch {
        /// 1-based user id
        user: usize,
    },
    /// Print a user's generated client config (encrypted mode)
    Clash {
        /// 1-based user id
        user: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let path = match cli.command {
        Commands::Status => "/".to_string(),
        Commands::Fetch { user } => format!("/{}/sub.yaml", user),
        Commands::Clash { user } => format!("/{}/clash.yaml", user),
    };

    let res = client.get(format!("{}{}", base, path)).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Some(id) = request_id {
            eprintln!("Request: {}", id);
        }
        if !body.is_empty() {
            eprintln!("Response: {}", body.trim_end());
        }
        std::process::exit(1);
    }

    print!("{}", body);
    Ok(())
}
