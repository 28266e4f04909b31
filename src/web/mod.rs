//! Embedded web UI server.
//!
//! A small axum application served from a dedicated OS thread running a
//! current-thread tokio runtime, so the subsystem obeys the same
//! start/drain/join lifecycle as the other service threads. The listener is
//! bound synchronously during start — a bind failure surfaces immediately and
//! the bootstrapper skips the subsystem.

use crate::config::{ListenerScope, Settings, WebSettings};
use crate::error::{ChassisError, Result};
use crate::pool::Dispatcher;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

struct StatusInfo {
    app_name: String,
    settings: Settings,
    dispatcher: Option<Dispatcher>,
}

#[derive(Clone)]
struct WebState {
    info: Arc<StatusInfo>,
}

pub struct WebServer {
    addr: SocketAddr,
    home_uri: String,
    shutdown: Option<oneshot::Sender<()>>,
    service: Option<JoinHandle<()>>,
}

impl WebServer {
    /// Bind and start serving. IPv4 binding is preferred when both protocols
    /// are requested.
    pub fn start(
        app_name: &str,
        settings: &Settings,
        dispatcher: Option<Dispatcher>,
    ) -> Result<Self> {
        let web = &settings.web;
        let bind_addr = preferred_bind(web)
            .ok_or_else(|| ChassisError::NetworkInit("no listener protocol requested".into()))?;
        let listener = TcpListener::bind(bind_addr)
            .map_err(|err| ChassisError::NetworkInit(format!("bind {bind_addr}: {err}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| ChassisError::NetworkInit(err.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|err| ChassisError::NetworkInit(err.to_string()))?;

        let home_uri = web
            .web_root
            .as_deref()
            .map(|root| format!("/{}", root.trim_matches('/')))
            .unwrap_or_else(|| "/".to_string());

        let state = WebState {
            info: Arc::new(StatusInfo {
                app_name: app_name.to_string(),
                settings: settings.clone(),
                dispatcher,
            }),
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let service = std::thread::Builder::new()
            .name("web-server".into())
            .spawn(move || serve(listener, state, shutdown_rx))
            .map_err(|err| ChassisError::NetworkInit(err.to_string()))?;

        tracing::info!(%addr, "web server listening");
        Ok(Self {
            addr,
            home_uri,
            shutdown: Some(shutdown_tx),
            service: Some(service),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Default URL for reaching the application.
    pub fn launch_url(&self) -> String {
        format!("http://{}{}", self.addr, self.home_uri)
    }

    /// Stop accepting requests, finish in-flight ones, and join the service
    /// thread. Idempotent.
    pub fn dismiss(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(service) = self.service.take() {
            let _ = service.join();
            tracing::debug!("web server dismissed");
        }
    }
}

impl Drop for WebServer {
    fn drop(&mut self) {
        self.dismiss();
    }
}

fn preferred_bind(web: &WebSettings) -> Option<SocketAddr> {
    if let Some(v4) = &web.ipv4 {
        let ip = v4
            .bind
            .unwrap_or_else(|| default_address(web.scope, false));
        return Some(SocketAddr::new(ip, v4.port));
    }
    if let Some(v6) = &web.ipv6 {
        let ip = v6.bind.unwrap_or_else(|| default_address(web.scope, true));
        return Some(SocketAddr::new(ip, v6.port));
    }
    None
}

fn default_address(scope: ListenerScope, ipv6: bool) -> IpAddr {
    match (scope, ipv6) {
        (ListenerScope::LocalMachine, false) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        (ListenerScope::LocalMachine, true) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        (_, false) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        (_, true) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

fn serve(listener: TcpListener, state: WebState, shutdown_rx: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "web server runtime failed to build");
            return;
        }
    };
    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, "web server listener registration failed");
                return;
            }
        };
        let app = Router::new()
            .route("/", get(index))
            .route("/status", get(status))
            .with_state(state);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(err) = served {
            tracing::error!(error = %err, "web server exited with an error");
        }
    });
}

async fn index(State(state): State<WebState>) -> Html<String> {
    Html(format!(
        "<html><head><title>{name}</title></head>\
         <body><h1>{name}</h1>\
         <p>Application is running. Status is served at <a href=\"/status\">/status</a>.</p>\
         </body></html>",
        name = state.info.app_name
    ))
}

async fn status(State(state): State<WebState>) -> Json<Value> {
    let info = &state.info;
    let mut doc = serde_json::json!({
        "application": info.app_name,
        "settings": info.settings,
    });
    if let Some(dispatcher) = &info.dispatcher {
        doc["pool"] = serde_json::to_value(dispatcher.stats()).unwrap_or(Value::Null);
    }
    Json(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn ephemeral_settings() -> Settings {
        Settings::defaults(true)
    }

    #[test]
    fn serves_status_and_dismisses_cleanly() {
        let settings = ephemeral_settings();
        let mut server = WebServer::start("TestApp", &settings, None).unwrap();
        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);
        assert!(server.launch_url().starts_with("http://127.0.0.1:"));

        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream
            .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("TestApp"), "{response}");

        server.dismiss();
        server.dismiss();
    }

    #[test]
    fn bind_conflict_is_a_network_init_failure() {
        let occupied = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = occupied.local_addr().unwrap().port();
        let mut settings = ephemeral_settings();
        if let Some(v4) = settings.web.ipv4.as_mut() {
            v4.port = port;
        }
        assert!(matches!(
            WebServer::start("TestApp", &settings, None),
            Err(ChassisError::NetworkInit(_))
        ));
    }

    #[test]
    fn web_root_shapes_the_launch_url() {
        let mut settings = ephemeral_settings();
        settings.web.web_root = Some("ui".to_string());
        let mut server = WebServer::start("TestApp", &settings, None).unwrap();
        assert!(server.launch_url().ends_with("/ui"));
        server.dismiss();
    }
}
