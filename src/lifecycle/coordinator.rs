//! Lifecycle drain coordinator.
//!
//! Owns every handle that must be released at shutdown and walks them in the
//! one safe order. `dismiss` is idempotent, so the context destructor and an
//! explicit caller can both invoke it.

use super::registry::{ServiceState, SubsystemId, SubsystemRegistry};
use crate::config::ConfigImage;
use crate::logpipe::{LogSink, LogWriter};
use crate::net::NetIo;
use crate::pool::Dispatcher;
use crate::render::TextRenderer;
use crate::secure::SecretPool;
use crate::strings::StringPool;
use crate::vres::VrMap;
use crate::web::WebServer;
use std::thread::JoinHandle;
use strum_macros::Display;

/// Teardown extension point for the outer application's own resources.
pub type TeardownHook = Box<dyn FnOnce(&LogSink) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DismissState {
    Active,
    Dismissing,
    Dismissed,
}

pub struct DrainCoordinator {
    state: DismissState,
    registry: SubsystemRegistry,
    teardown: Option<TeardownHook>,
    sink: LogSink,
    log_service: Option<JoinHandle<LogWriter>>,
    pool: Option<(Dispatcher, JoinHandle<()>)>,
    net: Option<NetIo>,
    web: Option<WebServer>,
    renderer: Option<TextRenderer>,
    strings: Option<StringPool>,
    secrets: Option<SecretPool>,
    rmap: Option<VrMap>,
    config_image: Option<ConfigImage>,
}

impl DrainCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: SubsystemRegistry,
        teardown: Option<TeardownHook>,
        sink: LogSink,
        log_service: JoinHandle<LogWriter>,
        pool: Option<(Dispatcher, JoinHandle<()>)>,
        net: Option<NetIo>,
        web: Option<WebServer>,
        renderer: Option<TextRenderer>,
        strings: StringPool,
        secrets: Option<SecretPool>,
        rmap: VrMap,
        config_image: Option<ConfigImage>,
    ) -> Self {
        Self {
            state: DismissState::Active,
            registry,
            teardown,
            sink,
            log_service: Some(log_service),
            pool,
            net,
            web,
            renderer,
            strings: Some(strings),
            secrets,
            rmap: Some(rmap),
            config_image,
        }
    }

    pub fn state(&self) -> DismissState {
        self.state
    }

    pub fn registry(&self) -> &SubsystemRegistry {
        &self.registry
    }

    pub(crate) fn web(&self) -> Option<&WebServer> {
        self.web.as_ref()
    }

    pub(crate) fn renderer(&self) -> Option<&TextRenderer> {
        self.renderer.as_ref()
    }

    pub(crate) fn config_image(&self) -> Option<&ConfigImage> {
        self.config_image.as_ref()
    }

    /// Release the configuration image ahead of dismissal. The buffer is
    /// zeroed as it drops; releasing twice is a no-op.
    pub(crate) fn release_config_image(&mut self) {
        self.config_image = None;
    }

    /// Drain and dismiss every subsystem, in the reverse of the startup
    /// dependency order. Idempotent: a second call returns immediately.
    ///
    /// Joins are unbounded; they cannot hang because each service loop is
    /// guaranteed to observe its drain signal and exit, but a submitted job
    /// that never returns will stall the pool join.
    pub fn dismiss(&mut self) {
        if self.state != DismissState::Active {
            return;
        }
        self.state = DismissState::Dismissing;
        tracing::info!("lifecycle dismissal started");

        // 1. The application's own teardown runs first, while every service
        //    it may depend on is still up.
        if let Some(hook) = self.teardown.take() {
            if let Err(err) = hook(&self.sink) {
                self.sink.error(format!("Application teardown failed: {err:#}"));
            }
        }

        if let Some(mut renderer) = self.renderer.take() {
            renderer.dismiss();
            self.registry
                .set(SubsystemId::TextRenderer, ServiceState::Stopped);
        }

        // 2. UI-facing services stop before the pool they dispatch into.
        if let Some(mut web) = self.web.take() {
            self.registry.set(SubsystemId::WebUi, ServiceState::Draining);
            web.dismiss();
            self.registry.set(SubsystemId::WebUi, ServiceState::Stopped);
        }

        // 3. Network services.
        if let Some(mut net) = self.net.take() {
            net.dismiss();
            self.registry.set(SubsystemId::Network, ServiceState::Stopped);
        }

        // 4. Drain the pool before the log pipeline: draining workers may
        //    still be emitting log messages.
        if let Some((dispatcher, service)) = self.pool.take() {
            self.registry
                .set(SubsystemId::WorkerPool, ServiceState::Draining);
            dispatcher.drain();
            if service.join().is_err() {
                tracing::error!("thread pool service thread panicked during drain");
            }
            self.registry
                .set(SubsystemId::WorkerPool, ServiceState::Stopped);
        }

        // 5/6. Drain the log pipeline, then close the file it was writing.
        if let Some(service) = self.log_service.take() {
            self.registry
                .set(SubsystemId::LogPipeline, ServiceState::Draining);
            self.sink.drain();
            match service.join() {
                Ok(mut writer) => writer.close(),
                Err(_) => tracing::error!("log server thread panicked during drain"),
            }
            self.sink.mark_closed();
            self.registry
                .set(SubsystemId::LogPipeline, ServiceState::Stopped);
        }

        // 7. Pools of plain data, now that nothing logs or resolves strings.
        if let Some(strings) = self.strings.take() {
            strings.dismiss();
            self.registry
                .set(SubsystemId::StringPool, ServiceState::Stopped);
        }
        if let Some(secrets) = self.secrets.take() {
            secrets.dismiss();
            self.registry
                .set(SubsystemId::SecretPool, ServiceState::Stopped);
        }

        // 8. The resource mapper.
        if let Some(rmap) = self.rmap.take() {
            rmap.dismiss();
            self.registry
                .set(SubsystemId::ResourceMapper, ServiceState::Stopped);
        }

        // 9. The configuration image, if the application never released it.
        self.config_image = None;

        self.state = DismissState::Dismissed;
        tracing::info!("lifecycle dismissal complete");
    }
}
