use std::sync::Arc;

use crate::config::{EngineConfig, GenConfig};
use crate::error::GpxtxError;
use crate::generator::{CompiledGenerator, LoopExit, run_generator};
use crate::shutdown::Shutdown;
use crate::transport::{TcpSender, Transport};

/// Owns every compiled generator and launches one loop per generator.
pub struct Engine {
    config: EngineConfig,
    generators: Vec<Arc<CompiledGenerator>>,
    transport: Arc<dyn Transport>,
}

impl Engine {
    /// Compile every configured generator and send over TCP. Any load or
    /// compile failure aborts construction.
    pub fn new(gen_config: &GenConfig, config: EngineConfig) -> Result<Self, GpxtxError> {
        let transport = Arc::new(TcpSender::from_config(&config));
        Self::with_transport(gen_config, config, transport)
    }

    pub fn with_transport(
        gen_config: &GenConfig,
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, GpxtxError> {
        let generators = gen_config
            .generators
            .iter()
            .map(CompiledGenerator::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_generators(generators, config, transport))
    }

    /// Build from already compiled generators. Generators without waypoints
    /// are dropped here and never started.
    pub fn from_generators(
        generators: Vec<CompiledGenerator>,
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let generators = generators
            .into_iter()
            .filter(|g| {
                if g.waypoints().is_empty() {
                    log::warn!("generator '{}' has no waypoints, skipping", g.description());
                    false
                } else {
                    true
                }
            })
            .map(Arc::new)
            .collect();
        Self {
            config,
            generators,
            transport,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generators(&self) -> &[Arc<CompiledGenerator>] {
        &self.generators
    }

    /// Launch every generator, `start_offset` apart, and wait for all of them
    /// to finish. Loops end on render failure or once `shutdown` fires. The
    /// result holds one exit per launched generator, in launch order.
    pub async fn run(&self, mut shutdown: Shutdown) -> Vec<LoopExit> {
        let mut tasks = Vec::with_capacity(self.generators.len());
        for (i, generator) in self.generators.iter().enumerate() {
            if i > 0 && !self.config.start_offset.is_zero() {
                log::debug!("waiting {:?} before launching '{}'", self.config.start_offset, generator.description());
                tokio::select! {
                    _ = tokio::time::sleep(self.config.start_offset) => {}
                    _ = shutdown.triggered() => {
                        log::info!("shutdown requested, {} of {} generators launched", i, self.generators.len());
                        break;
                    }
                }
            }
            tasks.push(tokio::spawn(run_generator(
                generator.clone(),
                self.transport.clone(),
                shutdown.clone(),
            )));
        }

        let exits = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    log::error!("generator task failed: {e}");
                    LoopExit::Panicked
                })
            })
            .collect();
        log::warn!("all generators returned");
        exits
    }
}
