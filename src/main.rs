use anvil_sqli::cli::args::Cli;
use anvil_sqli::core::context::Context;
use anvil_sqli::core::engine::Scanner;
use anvil_sqli::core::rate_limit::RateLimiter;
use anvil_sqli::http::client::HttpClient;
use anvil_sqli::http::Transport;
use anvil_sqli::reporting;
use anvil_sqli::sqli::tamper::{list_tampers, TamperTransport};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const BANNER: &str = r#"
 ╔════════════════════════════════════════════════════════════════════╗
 ║                                                                    ║
 ║     █████╗ ███╗   ██╗██╗   ██╗██╗██╗                               ║
 ║    ██╔══██╗████╗  ██║██║   ██║██║██║                               ║
 ║    ███████║██╔██╗ ██║██║   ██║██║██║                               ║
 ║    ██╔══██║██║╚██╗██║╚██╗ ██╔╝██║██║                               ║
 ║    ██║  ██║██║ ╚████║ ╚████╔╝ ██║███████╗                          ║
 ║    ╚═╝  ╚═╝╚═╝  ╚═══╝  ╚═══╝  ╚═╝╚══════╝   sqli                   ║
 ║                                                                    ║
 ║    SQL injection detection and read-only extraction                ║
 ║                                                                    ║
 ╚════════════════════════════════════════════════════════════════════╝
"#;

fn print_banner() {
    println!("\x1b[36m{}\x1b[0m", BANNER);
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    // RUST_LOG wins over -v / --quiet
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("anvil_sqli={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !cli.no_banner && !cli.quiet {
        print_banner();
    }

    if cli.list_tampers {
        for (name, description) in list_tampers() {
            println!("  {:<15} {}", name, description);
        }
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    let ctx = Context::from_cli(cli)?;

    // -------------------------------------------------
    // Transport
    // -------------------------------------------------
    let client = HttpClient::new(ctx.scope.clone(), RateLimiter::new(ctx.rate_limit))?
        .with_timeout(ctx.timeout)?;
    if let Some(proxy) = &ctx.proxy {
        client.set_proxy(proxy)?;
    }

    let transport: Arc<dyn Transport> = if ctx.tamper.is_empty() {
        Arc::new(client)
    } else {
        tracing::info!("Tamper chain: {}", ctx.tamper.names().join(","));
        Arc::new(TamperTransport::new(Arc::new(client), ctx.tamper.clone()))
    };

    // -------------------------------------------------
    // Cancellation on Ctrl-C
    // -------------------------------------------------
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping scan");
                cancel.cancel();
            }
        });
    }

    // -------------------------------------------------
    // Scan
    // -------------------------------------------------
    let scanner = Scanner::new(ctx.config.clone(), transport);
    let mut result = scanner.scan(&cancel, ctx.target.clone()).await?;

    // -------------------------------------------------
    // ENUMERATION
    // -------------------------------------------------
    if ctx.enumeration.has_any() {
        if result.is_vulnerable() {
            for (label, extracted) in scanner.enumerate(&cancel, &result, &ctx.enumeration).await? {
                if label == "banner" && !extracted.value.is_empty() {
                    result.dbms_version = extracted.value.clone();
                }
                match &extracted.error {
                    Some(err) if extracted.value.is_empty() => {
                        println!("[-] {}: {}", label, err);
                    }
                    _ => {
                        let marker = if extracted.partial { " (partial)" } else { "" };
                        println!("[+] {}: '{}'{}", label, extracted.value, marker);
                    }
                }
            }
        } else {
            tracing::warn!("No injectable parameter found, skipping extraction");
        }
    }

    // -------------------------------------------------
    // Report
    // -------------------------------------------------
    let rendered = reporting::render(&result, &ctx.output_format)?;
    match &ctx.output_file {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            tracing::info!("Report written to {}", path);
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
