use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use edge_gateway::auth::{fresh_claims, TokenValidator};
use edge_gateway::config::AuthConfig;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the edge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full dependency health report
    Health,
    /// Readiness probe
    Ready,
    /// Liveness probe
    Live,
    /// Sign a development token with the shared secret
    Token {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,
        #[arg(long, env = "GATEWAY_JWT_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long, default_value = "HS256")]
        algorithm: String,
    },
    /// Count the caller's active sessions
    Sessions {
        #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Ready => {
            let res = client.get(format!("{}/ready", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Live => {
            let res = client.get(format!("{}/live", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Token {
            user_id,
            email,
            role,
            tenant_id,
            ttl_secs,
            secret,
            algorithm,
        } => {
            let config = AuthConfig {
                jwt_secret: secret,
                algorithm,
                ..AuthConfig::default()
            };
            let validator = TokenValidator::from_config(&config)?;
            let claims = fresh_claims(&user_id, &email, role.as_deref(), tenant_id.as_deref(), ttl_secs);
            println!("{}", validator.sign(&claims)?);
        }
        Commands::Sessions { token } => {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
            let res = client
                .get(format!("{}/api/v1/sessions/count", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        std::process::exit(1);
    }
    Ok(())
}
