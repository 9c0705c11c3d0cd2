pub mod conn_call;
pub mod conn_sub;

use crate::auth::{Authority, StaticPolicy};
use crate::config::Config;
use crate::group::{GroupRegistry, ScanReport, UserDirectory};
use crate::metrics::Metrics;
use crate::mutation::{SpawnRunner, ToolRunner};
use crate::sys::etc_files::{read_group_file, read_passwd_file};
use crate::sys::peer::Subject;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::{UnixListener, UnixStream};

pub struct Context {
    pub groups: Arc<GroupRegistry>,
    pub users: Arc<UserDirectory>,
    pub authority: Arc<dyn Authority>,
    pub runner: Arc<dyn ToolRunner>,
    pub metrics: Arc<Metrics>,
    pub cfg: Config,
}

impl Context {
    pub fn new(cfg: Config, authority: Arc<dyn Authority>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            groups: Arc::new(GroupRegistry::new(cfg.notify_capacity)),
            users: Arc::new(UserDirectory::new()),
            authority,
            runner,
            metrics: Arc::new(Metrics::new()),
            cfg,
        }
    }

    /// Re-read both databases and fold the result into the registry.
    pub fn rescan(&self) -> anyhow::Result<ScanReport> {
        let users = read_passwd_file(&self.cfg.passwd_file)?;
        let entries = read_group_file(&self.cfg.group_file)?;
        self.users.replace_all(users);
        let report = self.groups.apply_scan(&entries, self.users.as_ref());
        self.metrics.inc_rescans();
        self.metrics
            .inc_groups_changed((report.updated + report.removed) as u64);
        Ok(report)
    }
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    tracing::info!("Starting accountsd at {}", cfg.socket_path);

    // Remove old socket
    if Path::new(&cfg.socket_path).exists() {
        fs::remove_file(&cfg.socket_path)?;
    }

    let pid = std::process::id();
    fs::write(&cfg.pid_path, pid.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to write PID file to {}: {}", cfg.pid_path, e))?;

    let listener = UnixListener::bind(&cfg.socket_path)?;

    let authority: Arc<dyn Authority> = Arc::new(StaticPolicy::new(cfg.admin_uids.clone()));
    let runner: Arc<dyn ToolRunner> = Arc::new(SpawnRunner);
    let ctx = Arc::new(Context::new(cfg.clone(), authority, runner));

    let report = ctx.rescan()?;
    tracing::info!(
        "Loaded {} groups, {} users",
        ctx.groups.len(),
        ctx.users.len()
    );
    tracing::debug!(?report, "initial scan");

    let scan_ctx = ctx.clone();
    tokio::spawn(async move {
        rescan_loop(scan_ctx).await;
    });

    tokio::select! {
        res = serve(listener, ctx.clone()) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    let m = &ctx.metrics;
    tracing::info!(
        uptime_ms = m.uptime_ms(),
        rescans = Metrics::get(&m.rescans_total),
        groups_changed = Metrics::get(&m.groups_changed_total),
        mutations = Metrics::get(&m.mutations_total),
        failed = Metrics::get(&m.mutations_failed_total),
        denied = Metrics::get(&m.denials_total),
        "stopped"
    );

    let _ = fs::remove_file(&cfg.socket_path);
    let _ = fs::remove_file(&cfg.pid_path);
    Ok(())
}

pub async fn serve(listener: UnixListener, ctx: Arc<Context>) -> anyhow::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let c = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, c).await {
                        tracing::error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Accept error: {}", e);
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, ctx: Arc<Context>) -> anyhow::Result<()> {
    let subject = Subject::from_stream(&stream)?;
    tracing::trace!(uid = subject.uid, pid = ?subject.pid, "client connected");
    conn_call::handle_conn(&mut stream, &ctx, subject).await
}

/// Polls the database files and rescans when either one was modified.
async fn rescan_loop(ctx: Arc<Context>) {
    let mut tick = tokio::time::interval(Duration::from_millis(ctx.cfg.rescan_interval_ms));
    let mut last = stamps(&ctx.cfg);
    loop {
        tick.tick().await;
        match poll_once(&ctx, &mut last) {
            None => {}
            Some(Ok(report)) => tracing::debug!(?report, "rescan"),
            Some(Err(e)) => tracing::warn!("Rescan failed, retrying next tick: {}", e),
        }
    }
}

type Stamps = (Option<SystemTime>, Option<SystemTime>);

/// Rescans if the files changed since `last`, returning `None` otherwise.
/// `last` only advances on success, so a failed read is retried.
fn poll_once(ctx: &Context, last: &mut Stamps) -> Option<anyhow::Result<ScanReport>> {
    let now = stamps(&ctx.cfg);
    if now == *last {
        return None;
    }
    let res = ctx.rescan();
    if res.is_ok() {
        *last = now;
    }
    Some(res)
}

fn stamps(cfg: &Config) -> Stamps {
    let mtime = |p: &str| fs::metadata(p).and_then(|m| m.modified()).ok();
    (mtime(&cfg.group_file), mtime(&cfg.passwd_file))
}
