use anyhow::{bail, Context, Result};
use mutopia::config::{load_config, MutopiaConfig};
use mutopia::http::ResponseBody;
use mutopia::{Body, HttpClient, HttpResponse};
use serde_json::Value;
use tracing::{info, warn};

const USAGE: &str = "usage: mutopia <get|delete> <path>
       mutopia <post|put|patch> <path> [json]
       mutopia login <path> <json>
       mutopia <refresh|logout|status>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber (stderr, so stdout stays the response body)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mutopia=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("MUTOPIA_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => MutopiaConfig::default(),
    };
    let mut config = config.apply_env();
    // The CLI keeps its session between invocations
    if config.storage.path.is_none() {
        config.storage.path = Some("mutopia.db".to_string());
    }

    info!(
        base_url = %config.api.base_url,
        storage = ?config.storage.path,
        "Configuration loaded"
    );

    let client = HttpClient::from_config(&config)?;
    client.on_session_expired(|| warn!("Session expired, please login again"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let arg = |i: usize| args.get(i).map(String::as_str);

    match (arg(0), arg(1)) {
        (Some("get"), Some(path)) => print_response(client.get(path).await?),
        (Some("delete"), Some(path)) => print_response(client.delete(path).await?),
        (Some(verb @ ("post" | "put" | "patch")), Some(path)) => {
            let body = match arg(2) {
                Some(raw) => Body::Json(parse_json(raw)?),
                None => Body::Empty,
            };
            let response = match verb {
                "post" => client.post(path, body).await?,
                "put" => client.put(path, body).await?,
                _ => client.patch(path, body).await?,
            };
            print_response(response)
        }
        (Some("login"), Some(path)) => {
            let raw = arg(2).context("login needs a JSON credentials body")?;
            client.login(path, parse_json(raw)?).await?;
            println!("logged in");
            Ok(())
        }
        (Some("refresh"), None) => {
            client.refresh_session().await?;
            println!("session refreshed");
            Ok(())
        }
        (Some("logout"), None) => {
            client.logout()?;
            println!("logged out");
            Ok(())
        }
        (Some("status"), None) => {
            let state = if client.is_authenticated() {
                "authenticated"
            } else {
                "anonymous"
            };
            println!("{state}");
            Ok(())
        }
        _ => bail!("{USAGE}"),
    }
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Body must be valid JSON")
}

fn print_response(response: HttpResponse) -> Result<()> {
    match response.data {
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ResponseBody::Text(text) => println!("{text}"),
        ResponseBody::Binary(bytes) => println!("<{} bytes>", bytes.len()),
        ResponseBody::Empty => println!("{}", response.status),
    }
    Ok(())
}
