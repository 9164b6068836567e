use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use meiru::auth::ConfigAuth;
use meiru::config::Config;
use meiru::context::CoreContext;
use meiru::imap::ImapServer;
use meiru::mailstore::MailStore;
use meiru::smtp::{AuthRequest, ReceivedMail, SendQueue, SmtpServer};

#[derive(Parser)]
#[command(name = "meirud", about = "meiru mail server daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conf/meiru.conf")]
    config: PathBuf,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting tracing subscriber")?;

    info!("starting meirud");

    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let ctx = CoreContext::from_config(config)?;

    info!("  hostname:      {}", ctx.hostname);
    info!("  SMTP bind:     {}", ctx.smtp_bind);
    info!("  IMAP bind:     {}", ctx.imap_bind);
    info!("  max mail size: {} bytes", ctx.max_size);
    info!("  local domains: {}", ctx.local_domains.join(", "));
    info!("  message store: {}", ctx.db_file.display());

    let store = Arc::new(MailStore::from_config(&ctx.config)?);
    let auth: Arc<dyn AuthRequest> = Arc::new(ConfigAuth::new(Arc::clone(&ctx.config)));
    let queue = Arc::new(SendQueue::new(&ctx, Arc::clone(&store)));
    let sink: Arc<dyn ReceivedMail> = Arc::clone(&queue) as Arc<dyn ReceivedMail>;

    let smtp = SmtpServer::bind(&ctx, Arc::clone(&auth), sink)
        .await
        .context("binding SMTP listener")?;
    let imap = ImapServer::bind(&ctx, Arc::clone(&auth))
        .await
        .context("binding IMAP listener")?;

    // Every long-running task reports its terminal failure here; the first
    // arrival takes the whole process down. Worker panics surface through
    // the join handles rather than being lost.
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<(&'static str, anyhow::Error)>();

    supervise("smtp server", tokio::spawn(async move { smtp.run().await }), err_tx.clone());
    supervise("imap server", tokio::spawn(async move { imap.run().await }), err_tx.clone());
    supervise(
        "send queue",
        tokio::spawn(async move { queue.serve().await }),
        err_tx,
    );

    let (name, err) = err_rx
        .recv()
        .await
        .expect("error channel never closes before a failure");
    Err(err.context(format!("{name} terminated")))
}

/// Forwards a task's terminal error (or panic) to the supervisor channel.
fn supervise(
    name: &'static str,
    handle: tokio::task::JoinHandle<meiru::Result<()>>,
    err_tx: mpsc::UnboundedSender<(&'static str, anyhow::Error)>,
) {
    tokio::spawn(async move {
        let err = match handle.await {
            Ok(Ok(())) => anyhow::anyhow!("task exited unexpectedly"),
            Ok(Err(e)) => anyhow::Error::new(e),
            Err(join_err) => anyhow::anyhow!("task aborted: {join_err}"),
        };
        let _ = err_tx.send((name, err));
    });
}
