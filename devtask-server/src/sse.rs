//! Server-Sent Events stream and file watcher for live reload.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::{AppState, ChangeEvent};

#[derive(Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
}

impl From<&ChangeEvent> for SsePayload {
    fn from(event: &ChangeEvent) -> Self {
        let event_type = match event {
            ChangeEvent::SourceChanged => "source_changed",
            ChangeEvent::StaticChanged => "static_changed",
            ChangeEvent::OutputChanged => "output_changed",
        };
        SsePayload { event_type }
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();
    let mut shutdown = state.shutdown_rx.clone();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                received = rx.recv() => Some(received),
                _ = shutdown.changed() => None,
            };
            match next {
                None => break,
                Some(Ok(change_event)) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Some(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Some(Err(broadcast::error::RecvError::Closed)) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Start the file watcher in a background task.
pub fn start_file_watcher(state: AppState, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_file_watcher(state, poll_interval).await {
            warn!(error = %e, "file watcher failed");
        }
    })
}

async fn run_file_watcher(state: AppState, poll_interval: Duration) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(poll_interval),
    )?;

    for dir in state.watched_dirs() {
        if dir.exists() {
            watcher.watch(dir, RecursiveMode::Recursive)?;
            info!(path = %dir.display(), "watching directory");
        } else {
            debug!(path = %dir.display(), "skipping missing directory");
        }
    }

    // Batch at a fixed interval so a burst of writes (e.g. a compiler emitting
    // many files) becomes one reload.
    let mut pending_events: Vec<NotifyEvent> = Vec::new();
    let mut flush_tick = tokio::time::interval(Duration::from_millis(100));
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                pending_events.push(event);
            }
            _ = flush_tick.tick() => {
                if pending_events.is_empty() {
                    continue;
                }
                process_events(&state, &pending_events);
                pending_events.clear();
            }
        }
    }
}

/// Broadcast at most one event per kind for a batch of filesystem events.
fn process_events(state: &AppState, events: &[NotifyEvent]) {
    let mut kinds: Vec<ChangeEvent> = Vec::new();

    for event in events {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            continue;
        }
        for path in &event.paths {
            if let Some(kind) = state.classify(path)
                && !kinds.contains(&kind)
            {
                kinds.push(kind);
            }
        }
    }

    for kind in kinds {
        debug!(event = ?kind, "broadcasting change");
        let _ = state.event_tx.send(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DevServerOptions;
    use std::path::PathBuf;
    use tokio::sync::watch;

    fn modify_event(path: PathBuf) -> NotifyEvent {
        NotifyEvent {
            kind: EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![path],
            attrs: Default::default(),
        }
    }

    fn state(output_dir: Option<&str>) -> AppState {
        let mut options = DevServerOptions::new("/app/public/index.html", "/app/public", "/app/src");
        options.output_dir = output_dir.map(PathBuf::from);
        let (_tx, rx) = watch::channel(false);
        AppState::new(&options, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[test]
    fn burst_of_source_changes_emits_one_event() {
        let state = state(None);
        let mut rx = state.event_tx.subscribe();
        process_events(
            &state,
            &[
                modify_event(PathBuf::from("/app/src/App.js")),
                modify_event(PathBuf::from("/app/src/index.js")),
            ],
        );
        assert_eq!(drain(&mut rx), vec![ChangeEvent::SourceChanged]);
    }

    #[test]
    fn compiler_output_supersedes_source_changes() {
        let state = state(Some("/app/build"));
        let mut rx = state.event_tx.subscribe();
        process_events(
            &state,
            &[
                modify_event(PathBuf::from("/app/src/App.js")),
                modify_event(PathBuf::from("/app/build/static/js/main.js")),
                modify_event(PathBuf::from("/app/public/favicon.ico")),
            ],
        );
        assert_eq!(
            drain(&mut rx),
            vec![ChangeEvent::OutputChanged, ChangeEvent::StaticChanged]
        );
    }

    #[test]
    fn unrelated_paths_and_access_events_are_ignored() {
        let state = state(None);
        let mut rx = state.event_tx.subscribe();
        let access = NotifyEvent {
            kind: EventKind::Access(notify::event::AccessKind::Any),
            paths: vec![PathBuf::from("/app/src/App.js")],
            attrs: Default::default(),
        };
        process_events(
            &state,
            &[access, modify_event(PathBuf::from("/app/node_modules/x.js"))],
        );
        assert!(drain(&mut rx).is_empty());
    }
}
