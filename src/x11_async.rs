//! X11 Async Event Stream
//!
//! Wakes the single-threaded event loop when the X11 socket becomes
//! readable. A blocking mio poller watches the file descriptor; all
//! window manager state stays on the loop.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

/// X11 event stream with async readiness notification
pub struct X11EventStream {
    conn: Arc<RustConnection>,
    notify: Arc<Notify>,
    /// Dropping this stops the poller
    _shutdown: oneshot::Sender<()>,
}

impl X11EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let poller_notify = notify.clone();

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);
        poll.registry()
            .register(
                &mut mio::unix::SourceFd(&fd),
                mio::Token(0),
                mio::Interest::READABLE,
            )
            .context("Failed to register X11 socket with mio")?;

        let timeout = Duration::from_millis(100);
        tokio::task::spawn_blocking(move || {
            loop {
                match shutdown_rx.try_recv() {
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    _ => {
                        tracing::debug!("X11 socket poller stopping");
                        return;
                    }
                }
                if let Err(err) = poll.poll(&mut events, Some(timeout)) {
                    tracing::warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }
                if events.iter().any(|event| event.token() == mio::Token(0)) {
                    poller_notify.notify_one();
                }
            }
        });

        Ok(Self {
            conn,
            notify,
            _shutdown: shutdown,
        })
    }

    /// Every event x11rb has already read, without blocking
    pub fn drain(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("Failed to read X11 event")?
        {
            events.push(event);
        }
        Ok(events)
    }

    /// Resolves once the socket may have something to read
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }
}
