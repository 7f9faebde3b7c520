//! Async event loop around a [`DebugSession`].

use std::sync::Arc;

use spyglass_protocol::{DebuggerTransport, Incoming};
use spyglass_sourcemap::{FetchError, SourceMapFetcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bindings::SourceMapFetch;
use crate::breakpoints::BreakpointStorage;
use crate::session::DebugSession;

type FetchResult = (SourceMapFetch, Result<String, FetchError>);

/// Pumps backend messages into a session and performs the source map loads
/// it asks for.
///
/// Each load runs in its own task. The loop stops when `cancel` fires or the
/// backend channel closes, and hands the session back.
pub struct SessionDriver<T: DebuggerTransport, S: BreakpointStorage, F: SourceMapFetcher> {
    session: DebugSession<T, S>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    fetcher: Arc<F>,
    cancel: CancellationToken,
}

impl<T, S, F> SessionDriver<T, S, F>
where
    T: DebuggerTransport,
    S: BreakpointStorage,
    F: SourceMapFetcher,
{
    pub fn new(
        session: DebugSession<T, S>,
        incoming: mpsc::UnboundedReceiver<Incoming>,
        fetcher: Arc<F>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            incoming,
            fetcher,
            cancel,
        }
    }

    pub async fn run(mut self) -> DebugSession<T, S> {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<FetchResult>();
        self.spawn_fetches(&done_tx);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(target: "spyglass.debugger", "session driver cancelled");
                    break;
                }
                message = self.incoming.recv() => match message {
                    Some(message) => self.session.handle_message(message),
                    None => {
                        tracing::debug!(target: "spyglass.debugger", "backend channel closed");
                        break;
                    }
                },
                Some((fetch, result)) = done_rx.recv() => {
                    self.session.source_map_loaded(&fetch, result);
                }
            }
            self.spawn_fetches(&done_tx);
        }

        self.session
    }

    fn spawn_fetches(&mut self, done: &mpsc::UnboundedSender<FetchResult>) {
        for fetch in self.session.take_source_map_fetches() {
            let fetcher = Arc::clone(&self.fetcher);
            let done = done.clone();
            tracing::debug!(target: "spyglass.sourcemap", map_url = %fetch.map_url, "loading source map");
            tokio::spawn(async move {
                let result = fetcher.fetch(&fetch.map_url).await;
                // The driver may have stopped; the result is simply dropped.
                let _ = done.send((fetch, result));
            });
        }
    }
}
