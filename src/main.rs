use futures::StreamExt;
use gemfetch::{gemtext, Client, ClientIdentity, FetchOptions, Response, WebPkiRoots};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: gemfetch <uri> [--timeout-ms N] [--max-redirects N] [--webpki] [--json] [--cert FILE --key FILE]";

#[derive(Debug, Default)]
struct Args {
    uri: String,
    timeout_ms: Option<u64>,
    max_redirects: Option<u32>,
    webpki: bool,
    json: bool,
    cert: Option<String>,
    key: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut raw = std::env::args().skip(1);

    while let Some(arg) = raw.next() {
        let mut value = |name: &str| raw.next().ok_or_else(|| format!("{name} needs a value"));

        match arg.as_str() {
            "--timeout-ms" => args.timeout_ms = Some(value("--timeout-ms")?.parse::<u64>().map_err(|e| format!("--timeout-ms: {e}"))?),
            "--max-redirects" => args.max_redirects = Some(value("--max-redirects")?.parse::<u32>().map_err(|e| format!("--max-redirects: {e}"))?),
            "--cert" => args.cert = Some(value("--cert")?),
            "--key" => args.key = Some(value("--key")?),
            "--webpki" => args.webpki = true,
            "--json" => args.json = true,
            flag if flag.starts_with("--") => return Err(format!("unknown flag {flag}")),
            uri if args.uri.is_empty() => args.uri = uri.to_string(),
            extra => return Err(format!("unexpected argument {extra}")),
        }
    }

    if args.uri.is_empty() {
        return Err("missing uri".to_string());
    }

    Ok(args)
}

fn options(args: &Args) -> Result<FetchOptions, String> {
    let mut options = FetchOptions::default();

    if let Some(timeout_ms) = args.timeout_ms {
        options = options.timeout(Duration::from_millis(timeout_ms));
    }

    if let Some(max_redirects) = args.max_redirects {
        options = options.max_redirects(max_redirects);
    }

    if args.webpki {
        options = options.trust_policy(WebPkiRoots::new().map_err(|e| e.to_string())?);
    }

    match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            let cert = std::fs::read(cert).map_err(|e| format!("{cert}: {e}"))?;
            let key = std::fs::read(key).map_err(|e| format!("{key}: {e}"))?;
            options = options.client_identity(ClientIdentity::from_pem(&cert, &key).map_err(|e| e.to_string())?);
        }
        (None, None) => {}
        _ => return Err("--cert and --key go together".to_string()),
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let client = match options(&args) {
        Ok(options) => Client::new(options),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let Some(response) = client.get(&args.uri).await else {
        return ExitCode::FAILURE;
    };

    let media_type = response.media_type();

    match response {
        Response::Success { body, .. } => {
            if args.json && media_type.is_some_and(|media_type| media_type.is_gemtext()) {
                let nodes = gemtext::parse(body.clone().complete().await);
                match gemtext::to_json(&nodes) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("{e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                let mut lines = std::pin::pin!(body.stream());
                while let Some(line) = lines.next().await {
                    println!("{line}");
                }
            }

            match body.failure() {
                Some(failure) => {
                    eprintln!("body cut short: {failure}");
                    ExitCode::FAILURE
                }
                None => ExitCode::SUCCESS,
            }
        }
        Response::Input { prompt, sensitive, .. } => {
            eprintln!("{} input requested: {prompt}", if sensitive { "sensitive" } else { "plain" });
            ExitCode::FAILURE
        }
        Response::Error { status_code, meta, message } => {
            eprintln!("{status_code} {}: {meta}", message.unwrap_or_default());
            ExitCode::FAILURE
        }
        Response::ClientCertificateRequired { status_code, meta } => {
            eprintln!("{status_code} client certificate required: {meta}");
            ExitCode::FAILURE
        }
        Response::Unknown { status_code, message } => {
            match status_code {
                Some(status_code) => eprintln!("unexpected status {status_code}: {message}"),
                None => eprintln!("{message}"),
            }
            ExitCode::FAILURE
        }
    }
}
