//! Configuration settings and the value extractor.
//!
//! The extractor walks the well-known scopes of a parsed configuration
//! document (`<logging>`, `<threads>`, `<vresmap>`, `<webui>`) and fills a
//! typed [`Settings`] snapshot. The snapshot is mutated only during this
//! single pass and is read-only for the remainder of the process lifetime.

mod image;

pub use image::{ConfigImage, ImageLoader, resolve_redirect};

use crate::pool::MAX_POOL_WORKERS;
use crate::strings::unescape_xml;
use crate::vres::VrMap;
use crate::xml::{Cursor, Document};
use serde::Serialize;
use std::net::IpAddr;
use strum_macros::Display;

/// Worker floor when the web UI subsystem is enabled; its listeners and
/// request handlers share the pool and need headroom.
pub const WEBUI_MIN_WORKERS: usize = 5;

/// Worker floor for headless applications.
pub const BASE_MIN_WORKERS: usize = 2;

/// Where the effective settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum ConfigSource {
    Defaults,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutonomicsSettings {
    pub enabled: bool,
    pub monitor_cycles: u32,
    pub action_cycles: u32,
}

impl Default for AutonomicsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            monitor_cycles: 20,
            action_cycles: 10,
        }
    }
}

/// Listener visibility for the embedded web server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum ListenerScope {
    LocalMachine,
    Lan,
    Wan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BindSettings {
    /// Adapter-specific binding; `None` binds the scope's default address.
    pub bind: Option<IpAddr>,
    /// Desired port; 0 asks the platform for an ephemeral one.
    pub port: u16,
}

impl Default for BindSettings {
    fn default() -> Self {
        Self {
            bind: None,
            port: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebSettings {
    pub auto_launch: bool,
    pub web_root: Option<String>,
    pub scope: ListenerScope,
    /// 0 resolves to the worker maximum once that is known.
    pub max_connections: usize,
    pub ipv4: Option<BindSettings>,
    pub ipv6: Option<BindSettings>,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            auto_launch: true,
            web_root: None,
            scope: ListenerScope::LocalMachine,
            max_connections: 0,
            ipv4: Some(BindSettings::default()),
            ipv6: None,
        }
    }
}

/// The typed settings snapshot extracted from configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub verbose: bool,
    pub echo: bool,
    pub min_workers: usize,
    pub max_workers: usize,
    pub autonomics: AutonomicsSettings,
    pub web: WebSettings,
    pub source: ConfigSource,
    valid: bool,
}

impl Settings {
    /// Documented defaults, clamped for the given capability shape.
    pub fn defaults(web_enabled: bool) -> Self {
        let mut settings = Self {
            verbose: false,
            echo: false,
            min_workers: 1,
            max_workers: num_cpus::get(),
            autonomics: AutonomicsSettings::default(),
            web: WebSettings::default(),
            source: ConfigSource::Defaults,
            valid: true,
        };
        settings.clamp(web_enabled);
        settings
    }

    /// Whether the overall configuration is valid. Cleared when required
    /// values were absent or non-positive; the caller must check before
    /// proceeding.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    /// Extract settings from a parsed document. Missing optional scopes keep
    /// the documented defaults. A `<vresmap>` scope, when present, extends the
    /// given resource mapper.
    pub fn extract(doc: &Document, web_enabled: bool, rmap: Option<&VrMap>) -> Self {
        let mut settings = Self::defaults(web_enabled);
        settings.source = ConfigSource::File;

        let logging = doc.scope("logging");
        if !logging.is_null() {
            settings.verbose = logging.is_asserted("verbose");
            settings.echo = logging.is_asserted("echo");
        }

        let threads = doc.scope("threads");
        if !threads.is_null() {
            match threads.attr_int("min").filter(|min| *min > 0) {
                Some(min) => settings.min_workers = min as usize,
                None => {
                    tracing::warn!("<threads> min attribute absent or non-positive");
                    settings.valid = false;
                }
            }
            match threads.attr_int("max").filter(|max| *max > 0) {
                Some(max) => settings.max_workers = max as usize,
                None => {
                    tracing::warn!("<threads> max attribute absent or non-positive");
                    settings.valid = false;
                }
            }
            settings.extract_autonomics(&threads.scope("autonomics"));
        }

        if let Some(rmap) = rmap {
            let vres = doc.scope("vresmap");
            if !vres.is_null() {
                rmap.extend(&vres);
            }
        }

        let webui = doc.scope("webui");
        if !webui.is_null() {
            settings.web = extract_web(&webui);
        }

        settings.clamp(web_enabled);
        settings
    }

    fn extract_autonomics(&mut self, auto: &Cursor<'_>) {
        if auto.is_null() {
            return;
        }
        if auto.has_attr("enabled") {
            self.autonomics.enabled = auto.is_asserted("enabled");
        }
        for (name, slot) in [
            ("mcycles", &mut self.autonomics.monitor_cycles),
            ("acycles", &mut self.autonomics.action_cycles),
        ] {
            if auto.has_attr(name) {
                match auto.attr_int(name).filter(|cycles| *cycles > 0) {
                    Some(cycles) => *slot = cycles as u32,
                    None => {
                        tracing::warn!(attribute = name, "autonomics cycle count must be positive");
                        self.valid = false;
                    }
                }
            }
        }
    }

    /// Post-parse clamps: the worker maximum is capped to the platform
    /// ceiling, and the minimum is raised to the feature floor.
    fn clamp(&mut self, web_enabled: bool) {
        if self.max_workers > MAX_POOL_WORKERS {
            self.max_workers = MAX_POOL_WORKERS;
        }
        let floor = if web_enabled {
            WEBUI_MIN_WORKERS
        } else {
            BASE_MIN_WORKERS
        };
        if self.min_workers < floor {
            self.min_workers = floor;
        }
        if self.max_workers < self.min_workers {
            self.max_workers = self.min_workers;
        }
    }
}

fn extract_web(webui: &Cursor<'_>) -> WebSettings {
    // An explicit <webui> scope replaces the defaults wholesale.
    let mut web = WebSettings {
        auto_launch: true,
        web_root: None,
        scope: ListenerScope::LocalMachine,
        max_connections: 0,
        ipv4: None,
        ipv6: None,
    };

    if webui.has_attr("autolaunch") {
        web.auto_launch = webui.is_asserted("autolaunch");
    }
    web.web_root = webui.attr("root").map(unescape_xml);
    if let Some(scope) = webui.attr("scope") {
        web.scope = parse_scope(scope);
    }
    if let Some(max) = webui.attr_int("maxconnections").filter(|max| *max > 0) {
        web.max_connections = max as usize;
    }

    web.ipv4 = extract_bind(&webui.scope("ipv4"));
    web.ipv6 = extract_bind(&webui.scope("ipv6"));

    // Neither protocol requested: listen on IPv4.
    if web.ipv4.is_none() && web.ipv6.is_none() {
        web.ipv4 = Some(BindSettings::default());
    }
    web
}

fn extract_bind(node: &Cursor<'_>) -> Option<BindSettings> {
    if node.is_null() {
        return None;
    }
    if node.has_attr("listen") && !node.is_asserted("listen") {
        return None;
    }
    Some(BindSettings {
        bind: node.attr("bind").and_then(|addr| addr.trim().parse().ok()),
        port: node
            .attr_int("port")
            .filter(|port| (1..=i64::from(u16::MAX)).contains(port))
            .unwrap_or(0) as u16,
    })
}

fn parse_scope(value: &str) -> ListenerScope {
    if ["local", "host", "localhost"]
        .iter()
        .any(|alias| value.eq_ignore_ascii_case(alias))
    {
        ListenerScope::LocalMachine
    } else if ["lan", "hood", "neighbourhood"]
        .iter()
        .any(|alias| value.eq_ignore_ascii_case(alias))
    {
        ListenerScope::Lan
    } else if ["wan", "net", "web", "internet"]
        .iter()
        .any(|alias| value.eq_ignore_ascii_case(alias))
    {
        ListenerScope::Wan
    } else {
        ListenerScope::LocalMachine
    }
}
