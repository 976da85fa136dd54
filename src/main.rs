//! strata window manager
//!
//! Connects to the X server, takes over window management and feeds
//! server events to the core until the connection goes away or a
//! termination signal arrives.

mod x11_async;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

use strata::config::Config;
use strata::wm::WindowManager;
use strata::wm::ewmh::{Atoms, SyncAlarms, X11Server, acquire_wm_selection};
use strata::wm::hints::EventTranslator;

use crate::x11_async::X11EventStream;

struct StrataApp {
    _conn: Arc<RustConnection>,
    stream: X11EventStream,
    translator: EventTranslator,
    wm: WindowManager,
    /// Owner of the WM selection, alive as long as we are
    _selection_owner: Window,
}

impl StrataApp {
    fn new(config: &Config, replace: bool) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);
        let display_name = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".into());

        let atoms = Rc::new(Atoms::new(conn.as_ref()).context("Failed to intern atoms")?);
        let selection_owner = acquire_wm_selection(&conn, &atoms, screen_num, replace)?;

        let alarms = SyncAlarms::default();
        let server = X11Server::new(conn.clone(), atoms.clone(), alarms.clone());
        let mut wm = WindowManager::new(Box::new(server), &display_name, config);

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        wm.add_screen(
            root,
            i32::from(screen.width_in_pixels),
            i32::from(screen.height_in_pixels),
        );

        let translator = EventTranslator::new(conn.clone(), atoms, alarms);
        let stream =
            X11EventStream::new(conn.clone()).context("Failed to initialize X11 event stream")?;

        for event in translator.scan_existing(root)? {
            wm.handle_event(event);
        }
        wm.flush();

        Ok(Self {
            _conn: conn,
            stream,
            translator,
            wm,
            _selection_owner: selection_owner,
        })
    }

    async fn run(mut self) -> Result<()> {
        info!("Starting main event loop");
        loop {
            self.wm.dispatch_timeouts(Instant::now());
            self.wm.flush();

            let events = self.stream.drain()?;
            if !events.is_empty() {
                for event in events {
                    self.dispatch(event);
                }
                continue;
            }

            let deadline = self.wm.next_timeout();
            tokio::select! {
                () = self.stream.wait_readable() => {}
                () = sleep_until(deadline) => {}
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        if let Event::Error(e) = &event {
            debug!("X11 error: {:?}", e);
            return;
        }
        match self.translator.translate(event) {
            Ok(translated) => {
                if let Some(time) = translated.time {
                    self.wm.display.last_event_time = time;
                }
                for event in translated.events {
                    self.wm.handle_event(event);
                }
            }
            Err(e) => debug!("Failed to translate event: {:#}", e),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending::<()>().await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting strata");

    let replace = std::env::args().any(|arg| arg == "--replace" || arg == "-r");
    if replace {
        info!("--replace flag detected: will attempt to replace existing WM");
    }

    let app = StrataApp::new(&config, replace)?;

    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        result = app.run() => {
            if let Err(e) = result {
                error!("Window manager error: {:#}", e);
                return Err(e);
            }
        }
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    Ok(())
}
