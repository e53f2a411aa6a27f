use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for cluster-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show endpoint state and pool counters
    Status,
    /// List nodes with status and load
    Nodes,
    /// Register or update a node
    AddNode {
        route: String,
        host: String,
        port: u16,
        #[arg(long, default_value = "mycluster")]
        balancer: String,
        #[arg(long, default_value_t = 100)]
        load: u32,
        #[arg(long)]
        secure: bool,
    },
    /// Remove a node
    RemoveNode { route: String },
    /// Take a node out of rotation
    Down { route: String },
    /// Put a node back into rotation
    Up { route: String },
    /// List balancers
    Balancers,
    /// Stop accepting new connections
    Pause,
    /// Resume accepting connections
    Resume,
    /// Drain connections and shut the proxy down
    Stop,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Nodes => client.get(format!("{}/admin/nodes", base)),
        Commands::AddNode { route, host, port, balancer, load, secure } => client
            .post(format!("{}/admin/nodes", base))
            .json(&json!({
                "route": route,
                "host": host,
                "port": port,
                "balancer": balancer,
                "load": load,
                "secure": secure,
            })),
        Commands::RemoveNode { route } => client.delete(format!("{}/admin/nodes/{}", base, route)),
        Commands::Down { route } => client.post(format!("{}/admin/nodes/{}/down", base, route)),
        Commands::Up { route } => client.post(format!("{}/admin/nodes/{}/up", base, route)),
        Commands::Balancers => client.get(format!("{}/admin/balancers", base)),
        Commands::Pause => client.post(format!("{}/admin/endpoint/pause", base)),
        Commands::Resume => client.post(format!("{}/admin/endpoint/resume", base)),
        Commands::Stop => client.post(format!("{}/admin/endpoint/stop", base)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
