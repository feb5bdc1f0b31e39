use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Command-line client for the failover gateway", long_about = None)]
struct Cli {
    /// Public API base URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API base URL
    #[arg(long, default_value = "http://localhost:8081")]
    admin_url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show breaker states and endpoints (admin API)
    Status,
    /// Publish a message
    Send { body: String },
    /// List consumed messages
    Messages,
    /// Store a blob
    PutBlob {
        container: String,
        name: String,
        body: String,
    },
    /// Fetch a blob
    GetBlob { container: String, name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let mut headers = HeaderMap::new();
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
            );
            let res = client
                .get(format!("{}/admin/status", cli.admin_url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Send { body } => {
            let res = client
                .post(format!("{}/api/message", cli.url))
                .json(&json!({ "body": body }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Messages => {
            let res = client.get(format!("{}/api/message", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::PutBlob { container, name, body } => {
            let res = client
                .post(format!("{}/api/blob", cli.url))
                .json(&json!({ "body": body, "name": name, "container": container }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::GetBlob { container, name } => {
            let res = client
                .get(format!("{}/api/blob/{}/{}", cli.url, container, name))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if status == StatusCode::NO_CONTENT {
        println!("(no content)");
        return Ok(());
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("{}", status),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
