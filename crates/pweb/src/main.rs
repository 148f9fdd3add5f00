use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pweb::inject::{ScriptBlock, StyleBlock};
use pweb::{Config, Exchange, ListenerOutcome, MirrorProxy, OutboundResponse, ProxyServer};

const EXAMPLES: &str = "\
Examples:
  pweb -a 127.0.0.1:3000  https://example.com
  pweb --hook  https://example.com
  pweb --proxy http://127.0.0.1:8080 https://example.com
  pweb --hook --path /__example__/  https://example.com
  pweb --css 'body{background:pink}' https://example.com";

#[derive(Parser, Debug)]
#[command(name = "pweb")]
#[command(version, about = "Quickly proxy a website", after_help = EXAMPLES)]
struct Cli {
    /// URL to proxy; only scheme and host are used
    #[arg(value_name = "URL", required_unless_present = "config")]
    url: Option<String>,

    /// Listen address [default: 127.0.0.1:3000]
    #[arg(short, long, value_name = "ADDRESS", env = "PWEB_ADDR")]
    addr: Option<String>,

    /// Path serving `?url=<target>` requests; empty disables it [default: /__proxy__/]
    #[arg(long, value_name = "STRING")]
    path: Option<String>,

    /// Upstream proxy URL (http or https)
    #[arg(long, value_name = "URL", env = "PWEB_PROXY")]
    proxy: Option<String>,

    /// Proxy browser side fetch/xhr requests
    #[arg(long)]
    hook: bool,

    /// CSS to inject into HTML pages
    #[arg(long, value_name = "STRING")]
    css: Option<String>,

    /// JavaScript to inject into HTML pages
    #[arg(long, value_name = "STRING")]
    js: Option<String>,

    /// YAML config file; command line flags take precedence
    #[arg(short, long, value_name = "FILE", env = "PWEB_CONFIG")]
    config: Option<PathBuf>,

    /// Skip TLS certificate verification towards the target
    #[arg(long)]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PWEB_LOG_LEVEL")]
    log_level: String,
}

impl Cli {
    /// Merge the config file (if any) with command line flags.
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => Config::new(String::new()),
        };

        if let Some(url) = self.url {
            config.target = url;
        }
        if let Some(addr) = self.addr {
            config.listen = addr;
        }
        if let Some(path) = self.path {
            config.mount_path = path;
        }
        if let Some(proxy) = self.proxy {
            config.upstream_proxy = Some(proxy);
        }
        if let Some(css) = self.css {
            config.inject_css = Some(css);
        }
        if let Some(js) = self.js {
            config.inject_js = Some(js);
        }
        config.hook |= self.hook;
        config.tls_skip_verify |= self.insecure;

        config.validate()?;
        Ok(config)
    }
}

/// Access log: one line per proxied response.
fn access_log(
    _body: Option<&Bytes>,
    exchange: &Exchange<'_>,
    _response: &mut OutboundResponse,
) -> ListenerOutcome {
    let request = exchange.request();
    info!(
        "{}  {}  {}  {}",
        request.method(),
        request.path(),
        request.referer().unwrap_or("-"),
        request.target()
    );
    ListenerOutcome::Unchanged
}

fn build_proxy(config: &Config) -> anyhow::Result<MirrorProxy> {
    let mut proxy = MirrorProxy::new(config.to_proxy_config()?)?;
    if let Some(css) = &config.inject_css {
        proxy = proxy.inject_html(StyleBlock::new().raw(css).html());
    }
    if let Some(js) = &config.inject_js {
        proxy = proxy.inject_html(ScriptBlock::new().raw(js).html());
    }
    if config.hook {
        proxy = proxy.use_browser_hook();
    }
    Ok(proxy.on("*", access_log))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.into_config()?;
    let proxy = build_proxy(&config)?;

    let addr = config
        .listen_addr()?
        .resolve()
        .await
        .with_context(|| format!("Failed to resolve listen address {}", config.listen))?;
    let listener = ProxyServer::bind(addr)?;

    info!("Server is listening at {}", config.listen);
    info!("Log Format: <method>  <path>  <referrer>  <real request url>");

    let server = ProxyServer::new(Arc::new(proxy));
    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
