//! Application bootstrapper.
//!
//! Constructs and starts each enabled subsystem in strict dependency order:
//!
//! ```text
//! string pool
//!    ↓
//! secure object pool (optional)
//!    ↓
//! resource mapper
//!    ↓
//! log queue + log writer + consumer thread
//!    ↓
//! configuration (load → redirect → extract)
//!    ↓
//! dispatcher + pool service thread (optional)
//!    ↓
//! network I/O (optional)
//!    ↓
//! web server (optional)
//!    ↓
//! text renderer (optional)
//! ```
//!
//! Failures along the way are absorbed, not raised: a missing configuration
//! applies defaults, a failed log file degrades to console/silent, an
//! unavailable network skips the web server. The returned [`AppContext`]
//! carries boolean status for the caller to check.

use super::capability::CapabilitySet;
use super::context::AppContext;
use super::coordinator::{DrainCoordinator, TeardownHook};
use super::registry::{ServiceState, SubsystemId, SubsystemRegistry};
use crate::config::{ConfigImage, ImageLoader, Settings, resolve_redirect};
use crate::logpipe::{LogServer, LogSink, LogWriter, log_channel};
use crate::net::NetIo;
use crate::pool::{Dispatcher, ThreadPool};
use crate::render::TextRenderer;
use crate::secure::{CharmContext, SecretPool};
use crate::strings::StringPool;
use crate::vres::VrMap;
use crate::web::WebServer;
use crate::xml::Document;
use chrono::Local;
use std::thread::JoinHandle;

pub struct Bootstrap {
    app_name: String,
    args: Vec<String>,
    caps: CapabilitySet,
    teardown: Option<TeardownHook>,
}

impl Bootstrap {
    /// Builder for an application named `app_name`, with no invocation
    /// arguments. Use [`Bootstrap::args`] to pass the real command line.
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            args: vec![app_name.clone()],
            app_name,
            caps: CapabilitySet::minimal(),
            teardown: None,
        }
    }

    /// Invocation arguments, program name first. A first positional
    /// argument roots the resource mapper; `-V`/`-E` switches condition
    /// logging.
    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args = args.into_iter().collect();
        if self.args.is_empty() {
            self.args.push(self.app_name.clone());
        }
        self
    }

    pub fn capabilities(mut self, caps: CapabilitySet) -> Self {
        self.caps = caps;
        self
    }

    /// Application teardown hook, invoked first during dismissal while every
    /// subsystem is still up.
    pub fn on_teardown<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&LogSink) -> anyhow::Result<()> + Send + 'static,
    {
        self.teardown = Some(Box::new(hook));
        self
    }

    /// Start every enabled subsystem and return the ready context.
    pub fn start(self) -> AppContext {
        let Self {
            app_name,
            args,
            caps,
            teardown,
        } = self;
        tracing::info!(app = %app_name, "application bootstrap starting");
        let mut registry = SubsystemRegistry::new();

        //  String pool first: everything else interns into it.
        let strings = StringPool::new();
        registry.set(SubsystemId::StringPool, ServiceState::Running);

        //  Secure object pool and the charm context for configuration loads.
        let (secrets, charm) = match caps.secure.config() {
            Some(secure) => {
                let pool = SecretPool::new();
                let charm = match &secure.key {
                    Some(key) => CharmContext::new(&pool, secure.scheme, key),
                    None => CharmContext::with_default_key(&pool),
                };
                registry.set(SubsystemId::SecretPool, ServiceState::Running);
                (Some(pool), charm)
            }
            None => (None, CharmContext::cleartext()),
        };

        //  Resource mapper.
        let rmap = VrMap::new(strings.clone(), &args);
        registry.set(SubsystemId::ResourceMapper, ServiceState::Running);

        //  Log pipeline: open the writer, then start the consumer thread.
        let (sink, log_service) = start_log_pipeline(&app_name, &rmap);
        registry.set(SubsystemId::LogPipeline, ServiceState::Running);

        //  Load and apply configuration.
        let web_enabled = caps.web_ui.is_enabled();
        let (mut settings, config_image) =
            build_configuration(&app_name, &rmap, &charm, &sink, web_enabled);
        apply_switches(&mut settings, &args, &rmap, &sink);
        sink.set_verbose(settings.verbose);
        if settings.echo {
            sink.set_echo(true);
        }
        if settings.web.max_connections == 0 {
            settings.web.max_connections = settings.max_workers;
        }

        //  Dispatcher and pool service thread.
        let (dispatcher, pool_entry) = if caps.workers.is_enabled() {
            let mut pool = ThreadPool::new();
            pool.set_workers(settings.min_workers, settings.max_workers);
            pool.set_autonomics(
                settings.autonomics.enabled,
                settings.autonomics.monitor_cycles,
                settings.autonomics.action_cycles,
            );
            let dispatcher = pool.dispatcher();
            let service = std::thread::Builder::new()
                .name("pool-service".into())
                .spawn(move || pool.run())
                .expect("spawning the pool service thread");
            registry.set(SubsystemId::WorkerPool, ServiceState::Running);
            tracing::debug!(
                min = settings.min_workers,
                max = settings.max_workers,
                "worker pool started"
            );
            (Some(dispatcher.clone()), Some((dispatcher, service)))
        } else {
            (None, None)
        };

        //  Network I/O.
        let (net, nio_available) = if caps.network.is_enabled() {
            let net = NetIo::init();
            let available = net.is_available();
            registry.set(
                SubsystemId::Network,
                if available {
                    ServiceState::Running
                } else {
                    ServiceState::Stopped
                },
            );
            (Some(net), available)
        } else {
            (None, false)
        };

        //  Web server, only with network I/O underneath it.
        let web = if caps.web_ui.is_enabled() {
            if nio_available {
                start_web(&app_name, &settings, dispatcher.clone(), &sink, &mut registry)
            } else {
                sink.error(
                    "ERROR: Unable to start the web server, because basic network I/O \
                     services were not available.",
                );
                None
            }
        } else {
            None
        };

        //  Text renderer.
        let renderer = if caps.text.is_enabled() {
            registry.set(SubsystemId::TextRenderer, ServiceState::Running);
            Some(TextRenderer::default())
        } else {
            None
        };

        tracing::info!(app = %app_name, "application bootstrap complete");

        let coordinator = DrainCoordinator::new(
            registry,
            teardown,
            sink.clone(),
            log_service,
            pool_entry,
            net,
            web,
            renderer,
            strings.clone(),
            secrets,
            rmap.clone(),
            config_image,
        );
        AppContext::new(
            app_name,
            sink,
            strings,
            rmap,
            dispatcher,
            settings,
            nio_available,
            coordinator,
        )
    }
}

/// Open the timestamped log file and start the consumer thread. A failed
/// open is non-fatal: the pipeline still runs, echo-only or silent, and a
/// warning goes to standard error since the sink itself is what failed.
fn start_log_pipeline(app_name: &str, rmap: &VrMap) -> (LogSink, JoinHandle<LogWriter>) {
    let virtual_name = format!(
        "Logs/{}_{}.log",
        Local::now().format("%Y%m%d_%H%M%S"),
        app_name
    );
    let path = rmap.map_file(&virtual_name);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let writer = match LogWriter::open(&path) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!(
                "WARNING: Log file '{}' could not be opened ({err}), logging is not available.",
                path.display()
            );
            LogWriter::closed()
        }
    };
    let open = writer.is_open();
    let (sink, rx) = log_channel(open);
    let server = LogServer::new(rx, writer);
    let service = std::thread::Builder::new()
        .name("log-server".into())
        .spawn(move || server.run())
        .expect("spawning the log server thread");
    (sink, service)
}

/// Load the configuration image, follow a redirect, and extract settings.
/// Every failure path lands on defaults; only the validity flag records it.
fn build_configuration(
    app_name: &str,
    rmap: &VrMap,
    charm: &CharmContext,
    sink: &LogSink,
    web_enabled: bool,
) -> (Settings, Option<ConfigImage>) {
    let loader = ImageLoader::new(rmap, charm);
    let image = match loader.load(app_name) {
        Ok(Some(image)) => match resolve_redirect(&loader, image) {
            Ok(Some(image)) => Some(image),
            Ok(None) => {
                sink.warn(
                    "WARNING: The redirected configuration resource could not be loaded, \
                     defaults apply.",
                );
                None
            }
            Err(err) => {
                sink.error(format!("ERROR: {err}."));
                None
            }
        },
        Ok(None) => {
            sink.warn(format!(
                "WARNING: No configuration resource found at 'Config/{app_name}.xml', \
                 defaults apply."
            ));
            None
        }
        Err(err) => {
            sink.error(format!("ERROR: Unable to load the configuration: {err}."));
            None
        }
    };

    let Some(image) = image else {
        let mut settings = Settings::defaults(web_enabled);
        settings.mark_invalid();
        return (settings, None);
    };

    let settings = match Document::parse(&image.as_text()) {
        Ok(doc) => Settings::extract(&doc, web_enabled, Some(rmap)),
        Err(_) => {
            sink.error("ERROR: The configuration XML is not a valid XML document.");
            let mut settings = Settings::defaults(web_enabled);
            settings.mark_invalid();
            settings
        }
    };
    (settings, Some(image))
}

/// Apply `-V`/`-E` command-line switches over the extracted settings.
fn apply_switches(settings: &mut Settings, args: &[String], rmap: &VrMap, sink: &LogSink) {
    let first_switch = if rmap.is_first_arg_used() { 2 } else { 1 };
    for arg in args.iter().skip(first_switch) {
        if arg.eq_ignore_ascii_case("-v") {
            settings.verbose = true;
        } else if arg.eq_ignore_ascii_case("-e") {
            settings.echo = true;
        } else {
            sink.warn(format!(
                "WARNING: Command line parameter '{arg}' is invalid and has been ignored."
            ));
        }
    }
}

fn start_web(
    app_name: &str,
    settings: &Settings,
    dispatcher: Option<Dispatcher>,
    sink: &LogSink,
    registry: &mut SubsystemRegistry,
) -> Option<WebServer> {
    match WebServer::start(app_name, settings, dispatcher) {
        Ok(server) => {
            sink.info(format!(
                "Default launch URL: '{}' to access the application.",
                server.launch_url()
            ));
            if !settings.web.auto_launch {
                println!(
                    "Start your browser and enter the following URL: '{}' to access the \
                     application.",
                    server.launch_url()
                );
            }
            registry.set(SubsystemId::WebUi, ServiceState::Running);
            Some(server)
        }
        Err(err) => {
            sink.error(format!("ERROR: Unable to start the web server: {err}."));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DismissState;
    use crate::lifecycle::registry::{ServiceState, SubsystemId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Config")).unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join("Config").join(name), content).unwrap();
        }
        dir
    }

    fn args_for(dir: &tempfile::TempDir) -> Vec<String> {
        vec![
            "TestApp".to_string(),
            dir.path().to_string_lossy().into_owned(),
        ]
    }

    #[test]
    fn bootstrap_with_configuration_is_valid_and_logs() {
        let dir = project(&[(
            "TestApp.xml",
            r#"<config><logging verbose="true"/><threads min="2" max="4"/></config>"#,
        )]);
        let mut context = Bootstrap::new("TestApp")
            .args(args_for(&dir))
            .capabilities(CapabilitySet::minimal().with_workers())
            .start();

        assert!(context.is_valid());
        assert!(context.is_log_open());
        assert!(context.is_verbose_logging());
        assert_eq!(context.min_workers(), 2);
        assert_eq!(context.max_workers(), 4);
        assert_eq!(
            context.subsystems().state(SubsystemId::WorkerPool),
            ServiceState::Running
        );

        context.log.info("bootstrap exercised");
        context.dismiss();
        assert_eq!(context.dismiss_state(), DismissState::Dismissed);
        assert!(!context.is_log_open());

        let logs: Vec<_> = std::fs::read_dir(dir.path().join("Logs"))
            .unwrap()
            .collect();
        assert_eq!(logs.len(), 1);
        let contents = std::fs::read_to_string(logs[0].as_ref().unwrap().path()).unwrap();
        assert!(contents.contains("bootstrap exercised"));
    }

    #[test]
    fn missing_configuration_applies_defaults_without_crashing() {
        let dir = project(&[]);
        let context = Bootstrap::new("TestApp").args(args_for(&dir)).start();

        assert!(!context.is_valid());
        assert!(!context.is_verbose_logging());
        assert_eq!(context.min_workers(), crate::config::BASE_MIN_WORKERS);
    }

    #[test]
    fn dismiss_is_idempotent_and_runs_teardown_once() {
        let dir = project(&[("TestApp.xml", "<config/>")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut context = Bootstrap::new("TestApp")
            .args(args_for(&dir))
            .capabilities(CapabilitySet::minimal().with_workers())
            .on_teardown(move |sink| {
                seen.fetch_add(1, Ordering::Relaxed);
                sink.info("application teardown ran");
                Ok(())
            })
            .start();

        context.dismiss();
        context.dismiss();
        drop(context);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn queued_work_survives_a_dismissal_during_submission() {
        let dir = project(&[(
            "TestApp.xml",
            r#"<config><threads min="2" max="4"/></config>"#,
        )]);
        let mut context = Bootstrap::new("TestApp")
            .args(args_for(&dir))
            .capabilities(CapabilitySet::minimal().with_workers())
            .start();

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..30 {
            let done = Arc::clone(&done);
            let log = context.log.clone();
            assert!(context.submit(move || {
                log.info("job logging while the pool drains");
                done.fetch_add(1, Ordering::Relaxed);
            }));
        }
        context.dismiss();
        assert_eq!(done.load(Ordering::Relaxed), 30);
    }

    #[test]
    fn command_line_switches_override_configuration() {
        let dir = project(&[(
            "TestApp.xml",
            r#"<config><logging verbose="false" echo="false"/></config>"#,
        )]);
        let mut args = args_for(&dir);
        args.push("-V".to_string());
        args.push("--bogus".to_string());
        let context = Bootstrap::new("TestApp").args(args).start();
        assert!(context.is_verbose_logging());
    }

    #[test]
    fn redirected_configuration_conditions_the_context() {
        let dir = project(&[
            ("TestApp.xml", r#"<config redirect="Config/Real.xml"/>"#),
            (
                "Real.xml",
                r#"<config><logging verbose="true"/></config>"#,
            ),
        ]);
        let context = Bootstrap::new("TestApp").args(args_for(&dir)).start();
        assert!(context.is_valid());
        assert!(context.is_verbose_logging());
    }

    #[test]
    fn web_ui_capability_brings_up_the_server() {
        let dir = project(&[(
            "TestApp.xml",
            r#"<config><threads min="1" max="8"/><webui autolaunch="false"/></config>"#,
        )]);
        let mut context = Bootstrap::new("TestApp")
            .args(args_for(&dir))
            .capabilities(CapabilitySet::minimal().with_web_ui())
            .start();

        assert!(context.is_net_io_available());
        assert_eq!(
            context.subsystems().state(SubsystemId::WebUi),
            ServiceState::Running
        );
        // Web UI raises the worker floor.
        assert_eq!(context.min_workers(), crate::config::WEBUI_MIN_WORKERS);
        let url = context.web_launch_url().expect("server is up");
        assert!(url.starts_with("http://"));

        context.dismiss();
        assert_eq!(
            context.subsystems().state(SubsystemId::WebUi),
            ServiceState::Stopped
        );
    }

    #[test]
    fn config_image_is_held_until_released() {
        let dir = project(&[(
            "TestApp.xml",
            r#"<config><simulation trials="100"/></config>"#,
        )]);
        let mut context = Bootstrap::new("TestApp").args(args_for(&dir)).start();
        let image = context.config_image().expect("image held for the app");
        let doc = Document::parse(&image.as_text()).unwrap();
        assert_eq!(doc.scope("simulation").attr_int("trials"), Some(100));
        context.release_config_image();
        assert!(context.config_image().is_none());
        context.release_config_image();
    }
}
