//! Process hooks behind the `gnmilite` management module.

use std::net::TcpListener;
use std::sync::Arc;

use gnmilite_core::observability::LogControl;
use gnmilite_server::{ServerControl, ServerOptions};
use tokio::sync::mpsc;

pub struct ProcessControl {
    log: Arc<LogControl>,
    /// Hands freshly bound listeners to the TCP accept loop. `None` when
    /// serving stdio.
    rebind: Option<mpsc::UnboundedSender<TcpListener>>,
}

impl ProcessControl {
    pub fn new(log: Arc<LogControl>, rebind: Option<mpsc::UnboundedSender<TcpListener>>) -> Self {
        Self { log, rebind }
    }
}

impl ServerControl for ProcessControl {
    fn set_debug(&self, on: bool) -> Result<(), String> {
        self.log.set_debug(on)
    }

    /// Binds the new address before answering, so a bad address fails the
    /// Set and the old listener keeps serving.
    fn apply(&self, opts: &ServerOptions) -> Result<(), String> {
        let Some(rebind) = &self.rebind else {
            tracing::info!(listen = %opts.listen, "serving stdio; listen address recorded only");
            return Ok(());
        };
        let listener = TcpListener::bind(&opts.listen)
            .map_err(|e| format!("cannot listen on {}: {}", opts.listen, e))?;
        listener.set_nonblocking(true).map_err(|e| e.to_string())?;
        rebind
            .send(listener)
            .map_err(|_| "server is shutting down".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(listen: &str) -> ServerOptions {
        ServerOptions {
            listen: listen.to_string(),
        }
    }

    #[test]
    fn test_apply_binds_before_handing_over() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let control = ProcessControl::new(Arc::new(LogControl::detached("gnmilite=info")), Some(tx));

        control.apply(&opts("127.0.0.1:0")).unwrap();
        let listener = rx.try_recv().unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);

        assert!(control.apply(&opts("not an address")).is_err());
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(control.apply(&opts("127.0.0.1:0")).is_err());
    }

    #[test]
    fn test_stdio_records_only() {
        let log = Arc::new(LogControl::detached("gnmilite=info"));
        let control = ProcessControl::new(Arc::clone(&log), None);
        control.apply(&opts("not an address")).unwrap();
        control.set_debug(true).unwrap();
        assert!(log.debug_enabled());
    }
}
