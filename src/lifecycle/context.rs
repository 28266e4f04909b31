//! The ready application context.
//!
//! One explicit context value is created at process start by the
//! [`Bootstrap`](super::Bootstrap) and passed by reference to every
//! collaborator; there is no ambient global state. Status crosses this
//! surface as plain booleans — no error type escapes it.

use super::coordinator::{DismissState, DrainCoordinator};
use super::registry::SubsystemRegistry;
use crate::config::{ConfigImage, Settings};
use crate::logpipe::LogSink;
use crate::pool::{Dispatcher, PoolStats};
use crate::render::TextRenderer;
use crate::strings::StringPool;
use crate::vres::VrMap;
use std::process::ExitStatus;

pub struct AppContext {
    app_name: String,
    /// Application log sink; clone freely into worker jobs.
    pub log: LogSink,
    /// Application-level string pool.
    pub strings: StringPool,
    /// Virtual resource mapper.
    pub rmap: VrMap,
    dispatcher: Option<Dispatcher>,
    settings: Settings,
    nio_available: bool,
    coordinator: DrainCoordinator,
}

impl AppContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        app_name: String,
        log: LogSink,
        strings: StringPool,
        rmap: VrMap,
        dispatcher: Option<Dispatcher>,
        settings: Settings,
        nio_available: bool,
        coordinator: DrainCoordinator,
    ) -> Self {
        Self {
            app_name,
            log,
            strings,
            rmap,
            dispatcher,
            settings,
            nio_available,
            coordinator,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    // --- status queries -------------------------------------------------

    pub fn is_log_open(&self) -> bool {
        self.log.is_open()
    }

    pub fn is_valid(&self) -> bool {
        self.settings.is_valid()
    }

    pub fn is_verbose_logging(&self) -> bool {
        self.settings.verbose
    }

    pub fn is_net_io_available(&self) -> bool {
        self.nio_available
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn min_workers(&self) -> usize {
        self.settings.min_workers
    }

    pub fn max_workers(&self) -> usize {
        self.settings.max_workers
    }

    /// Per-subsystem lifecycle states, in startup order.
    pub fn subsystems(&self) -> &SubsystemRegistry {
        self.coordinator.registry()
    }

    pub fn dismiss_state(&self) -> DismissState {
        self.coordinator.state()
    }

    // --- runtime toggles ------------------------------------------------

    pub fn set_verbose_logging(&mut self, on: bool) {
        self.settings.verbose = on;
        self.log.set_verbose(on);
    }

    pub fn set_echo_logging(&mut self, on: bool) {
        self.settings.echo = on;
        self.log.set_echo(on);
    }

    /// Mark the overall configuration invalid after application-level
    /// parsing found it unusable.
    pub fn mark_config_invalid(&mut self) {
        self.settings.mark_invalid();
    }

    // --- worker pool ----------------------------------------------------

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Queue a job on the worker pool. False without the workers capability
    /// or past the drain boundary.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatcher
            .as_ref()
            .map(|dispatcher| dispatcher.submit(job))
            .unwrap_or(false)
    }

    /// Block until all pool activity has completed.
    pub fn wait_until_pool_empty(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.wait_until_empty();
        }
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.dispatcher.as_ref().map(Dispatcher::stats)
    }

    /// Write pool statistics through the log sink.
    pub fn show_stats(&self) {
        if let Some(stats) = self.pool_stats() {
            self.log.info(format!(
                "Pool statistics: {} submitted, {} completed, {} queued, {} running, {} workers.",
                stats.submitted, stats.completed, stats.queued, stats.running, stats.workers
            ));
        }
    }

    // --- optional subsystems --------------------------------------------

    pub fn renderer(&self) -> Option<&TextRenderer> {
        self.coordinator.renderer()
    }

    pub fn web_launch_url(&self) -> Option<String> {
        self.coordinator.web().map(|web| web.launch_url())
    }

    // --- configuration image --------------------------------------------

    /// The loaded configuration image, for application-level parsing.
    pub fn config_image(&self) -> Option<&ConfigImage> {
        self.coordinator.config_image()
    }

    /// Release the configuration image once application parsing is done.
    /// The buffer is zeroed before its storage is freed; releasing twice is
    /// a no-op.
    pub fn release_config_image(&mut self) {
        self.coordinator.release_config_image();
    }

    // --- application execution ------------------------------------------

    /// Run a (virtual) file as a command and wait for its exit status.
    pub fn run_app(&self, app: &str, args: &[&str]) -> std::io::Result<ExitStatus> {
        let real = self.rmap.map_file(app);
        std::process::Command::new(real).args(args).status()
    }

    /// Launch a (virtual) file as a command without waiting for completion.
    pub fn launch_app(&self, app: &str, args: &[&str]) -> std::io::Result<()> {
        let real = self.rmap.map_file(app);
        std::process::Command::new(real).args(args).spawn().map(drop)
    }

    // --- shutdown -------------------------------------------------------

    /// Drain and dismiss every subsystem. Safe to call more than once; the
    /// destructor calls it as well.
    pub fn dismiss(&mut self) {
        self.coordinator.dismiss();
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.dismiss();
    }
}
