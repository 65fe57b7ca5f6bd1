use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::resolver::enrich::Enricher;
use crate::resolver::ResolverCache;
use crate::sink::{PublishFn, StreamSink, TopEvent};
use crate::top::stats::TableWriter;
use crate::top::TopSampler;
use crate::tracer::TrafficSource;

/// Agent wires all components together: resolver cache, enricher, top-K
/// sampler, and the reporting sink.
pub struct Agent {
    cfg: Config,
    cache: Arc<ResolverCache>,
    enricher: Option<Enricher>,
    sampler: Option<Arc<TopSampler>>,
    source: Option<Box<dyn TrafficSource>>,
    publish: Option<PublishFn>,
    cancel: CancellationToken,
}

impl Agent {
    /// Creates a new agent from validated configuration.
    pub fn new(cfg: Config) -> Self {
        let cache = Arc::new(ResolverCache::new(
            &cfg.resolver.passwd_path,
            &cfg.resolver.group_path,
        ));

        Self {
            cfg,
            cache,
            enricher: None,
            sampler: None,
            source: None,
            publish: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a kernel-side traffic source. Without one the agent still
    /// runs; the counter table just stays empty.
    pub fn with_source(mut self, source: Box<dyn TrafficSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the publish callback (default: one JSON line per tick on
    /// stdout).
    pub fn with_publish(mut self, publish: PublishFn) -> Self {
        self.publish = Some(publish);
        self
    }

    /// The shared resolver cache, for embedding frameworks that run
    /// several enrichment consumers against one host.
    pub fn resolver_cache(&self) -> Arc<ResolverCache> {
        Arc::clone(&self.cache)
    }

    /// Writer handle for the live counter table. Only valid while started.
    pub fn traffic_writer(&self) -> Option<TableWriter> {
        self.sampler.as_ref().map(|s| s.writer())
    }

    /// Start all components and begin sampling.
    pub async fn start(&mut self) -> Result<()> {
        // 1. Validate sampler parameters; a configuration error means the
        // pipeline never enters Running.
        let top_cfg = self
            .cfg
            .top
            .to_top_config()
            .context("configuring top-K sampler")?;

        // 2. Activate identity resolution. An unreadable host source
        // degrades the affected kind to numeric fallback; it does not stop
        // the pipeline.
        let enricher = if self.cfg.resolver.enabled {
            let enricher = Enricher::new(Arc::clone(&self.cache));
            if let Err(e) = enricher.start() {
                warn!(error = %e, "identity resolution degraded to numeric ids");
            }
            Some(enricher)
        } else {
            info!("identity resolution disabled");
            None
        };
        self.enricher = enricher.clone();

        // 3. Wire the per-tick pipeline: snapshot -> enrich -> emit.
        let sink = match self.publish.take() {
            Some(publish) => StreamSink::new(publish),
            None => StreamSink::stdout(),
        };

        let sampler = Arc::new(TopSampler::new(top_cfg));
        sampler.start(
            self.cancel.child_token(),
            Box::new(move |mut rows| {
                if let Some(enricher) = &enricher {
                    enricher.enrich_all(&mut rows);
                }
                sink.emit(&TopEvent { stats: rows });
            }),
        )?;

        self.sampler = Some(Arc::clone(&sampler));

        // 4. Attach the traffic source, if one was provided.
        match &mut self.source {
            Some(source) => {
                source
                    .attach(sampler.writer())
                    .with_context(|| format!("attaching traffic source {}", source.name()))?;
                info!(source = source.name(), "traffic source attached");
            }
            None => {
                warn!("no traffic source attached, counter table will stay empty");
            }
        }

        info!("agent started");

        Ok(())
    }

    /// Gracefully stop all components.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        // Detach the sample producer before tearing down the table.
        if let Some(source) = &mut self.source {
            if let Err(e) = source.detach() {
                error!(error = %e, "error detaching traffic source");
            }
        }

        // Synchronous disarm: no tick fires after this returns.
        if let Some(sampler) = &self.sampler {
            sampler.stop().await;
        }
        self.sampler = None;

        if let Some(enricher) = self.enricher.take() {
            enricher.stop();
        }

        info!("agent stopped");
    }
}
