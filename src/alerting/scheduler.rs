//! Alert loops and their supervisor.

use super::context::{AlertContext, AlertSettings};
use super::kind::AlertKind;
use super::probe::AlertEnv;
use super::store::{AlertConfigStore, AlertRecord, AlertSink};
use crate::config::AlertingConfig;
use crate::error::Result;
use crate::observability;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What one tick of an alert loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The kind is disabled; nothing was evaluated.
    Disabled,
    Healthy,
    /// The predicate failed; the counter was left alone.
    Inconclusive,
    /// A problem was counted but the trigger threshold is not reached yet.
    Pending { count: u32, trigger_times: u32 },
    Emitted,
    /// The threshold was reached but emission failed; retried on the next problem.
    EmitFailed,
}

/// Run one evaluation of `ctx`'s kind and update its counter.
pub async fn run_tick(ctx: &AlertContext, env: &AlertEnv, sink: &dyn AlertSink) -> TickOutcome {
    if !ctx.enabled() {
        return TickOutcome::Disabled;
    }

    let kind = ctx.kind();
    let message = match kind.evaluate(env, &ctx.rule()).await {
        Ok(Some(message)) => message,
        Ok(None) => return TickOutcome::Healthy,
        Err(err) => {
            warn!(cluster = %ctx.cluster(), %kind, error = %err, "Alert evaluation failed");
            observability::record_alert_evaluation_failed(ctx.cluster(), kind.name());
            return TickOutcome::Inconclusive;
        }
    };

    let count = ctx.increment();
    let trigger_times = ctx.trigger_times();
    if count < trigger_times {
        debug!(cluster = %ctx.cluster(), %kind, count, trigger_times, "Alert condition observed");
        return TickOutcome::Pending {
            count,
            trigger_times,
        };
    }

    let record = AlertRecord::new(ctx.cluster(), kind, message);
    match sink.emit(&record).await {
        Ok(()) => {
            ctx.reset();
            observability::record_alert_emitted(ctx.cluster(), kind.name());
            info!(cluster = %ctx.cluster(), %kind, message = %record.message, "Alert emitted");
            TickOutcome::Emitted
        }
        Err(err) => {
            warn!(cluster = %ctx.cluster(), %kind, error = %err, "Alert emission failed");
            TickOutcome::EmitFailed
        }
    }
}

async fn alert_loop(
    ctx: Arc<AlertContext>,
    env: Arc<AlertEnv>,
    sink: Arc<dyn AlertSink>,
    mut stop: oneshot::Receiver<()>,
) {
    info!(cluster = %ctx.cluster(), kind = %ctx.kind(), "Alert loop started");

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(ctx.interval()) => {
                run_tick(&ctx, &env, sink.as_ref()).await;
            }
        }
    }

    ctx.mark_stopped();
    info!(cluster = %ctx.cluster(), kind = %ctx.kind(), "Alert loop stopped");
}

type Contexts = BTreeMap<AlertKind, Arc<AlertContext>>;

/// Apply the store's settings to every context, defaulting kinds it lacks.
async fn apply_configs(
    cluster: &str,
    contexts: &Contexts,
    store: &dyn AlertConfigStore,
    defaults: &AlertingConfig,
) -> Result<()> {
    let mut loaded: BTreeMap<AlertKind, AlertSettings> = BTreeMap::new();
    for record in store.load(cluster).await? {
        let kind = match record.kind.parse::<AlertKind>() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(cluster, error = %err, "Ignoring alert config");
                continue;
            }
        };
        match AlertSettings::from_record(&record) {
            Ok(settings) => {
                loaded.insert(kind, settings);
            }
            Err(err) => warn!(cluster, %kind, error = %err, "Ignoring alert config"),
        }
    }

    for (kind, ctx) in contexts {
        let settings = loaded
            .remove(kind)
            .unwrap_or_else(|| AlertSettings::defaults(*kind, defaults));
        if settings != ctx.settings() {
            debug!(cluster, %kind, ?settings, "Alert settings changed");
            ctx.apply(settings);
        }
    }
    Ok(())
}

async fn reload_loop(
    cluster: String,
    contexts: Arc<Contexts>,
    store: Arc<dyn AlertConfigStore>,
    defaults: AlertingConfig,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(defaults.reload_interval) => {
                if let Err(err) = apply_configs(&cluster, &contexts, store.as_ref(), &defaults).await {
                    warn!(cluster = %cluster, error = %err, "Alert config reload failed");
                }
            }
        }
    }
}

/// Owns the alert loops of one cluster.
pub struct AlertSupervisor {
    cluster: String,
    contexts: Arc<Contexts>,
    store: Arc<dyn AlertConfigStore>,
    defaults: AlertingConfig,
    loops: Vec<JoinHandle<()>>,
    reload_stop: Option<oneshot::Sender<()>>,
}

impl AlertSupervisor {
    /// Load settings and start one loop per alert kind plus the reloader.
    pub async fn start(
        cluster: impl Into<String>,
        env: Arc<AlertEnv>,
        store: Arc<dyn AlertConfigStore>,
        sink: Arc<dyn AlertSink>,
        defaults: AlertingConfig,
    ) -> Result<Self> {
        let cluster = cluster.into();
        let contexts: Contexts = AlertKind::ALL
            .iter()
            .map(|&kind| {
                let settings = AlertSettings::defaults(kind, &defaults);
                (kind, Arc::new(AlertContext::new(cluster.clone(), kind, settings)))
            })
            .collect();
        apply_configs(&cluster, &contexts, store.as_ref(), &defaults).await?;
        let contexts = Arc::new(contexts);

        let mut loops = Vec::with_capacity(contexts.len() + 1);
        for ctx in contexts.values() {
            if let Some(stop) = ctx.begin_running() {
                loops.push(tokio::spawn(alert_loop(
                    Arc::clone(ctx),
                    Arc::clone(&env),
                    Arc::clone(&sink),
                    stop,
                )));
            }
        }

        let (reload_stop, reload_rx) = oneshot::channel();
        loops.push(tokio::spawn(reload_loop(
            cluster.clone(),
            Arc::clone(&contexts),
            Arc::clone(&store),
            defaults.clone(),
            reload_rx,
        )));

        info!(cluster = %cluster, kinds = contexts.len(), "Alert supervisor started");
        Ok(Self {
            cluster,
            contexts,
            store,
            defaults,
            loops,
            reload_stop: Some(reload_stop),
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Live context of one alert kind.
    pub fn context(&self, kind: AlertKind) -> Option<Arc<AlertContext>> {
        self.contexts.get(&kind).cloned()
    }

    /// Apply the store's current settings now.
    pub async fn reload(&self) -> Result<()> {
        apply_configs(&self.cluster, &self.contexts, self.store.as_ref(), &self.defaults).await
    }

    /// Stop every loop and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.signal_stop();
        for handle in std::mem::take(&mut self.loops) {
            if let Err(err) = handle.await {
                warn!(cluster = %self.cluster, error = %err, "Alert loop task failed");
            }
        }
        info!(cluster = %self.cluster, "Alert supervisor stopped");
    }

    fn signal_stop(&mut self) {
        for ctx in self.contexts.values() {
            ctx.stop();
        }
        if let Some(tx) = self.reload_stop.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for AlertSupervisor {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
