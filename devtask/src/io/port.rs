//! Port negotiation for the dev server.
//!
//! The preferred port is probed by binding and immediately closing a
//! listener. If it is taken, an interactive operator is offered the next
//! free port above it; a non-interactive run fails instead of guessing.

use std::io::ErrorKind;
use std::net::TcpListener;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::error::TaskError;
use crate::io::prompt::Prompter;

/// A port granted to one serve task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLease {
    pub port: u16,
    pub acquired_at: DateTime<Utc>,
}

impl PortLease {
    fn new(port: u16) -> Self {
        Self {
            port,
            acquired_at: Utc::now(),
        }
    }
}

/// Why a single probe failed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeError {
    InUse,
    PermissionDenied,
    Other(String),
}

/// Finds a usable port, prompting through `prompter` when one is available.
pub struct PortNegotiator<'a> {
    prompter: Option<&'a dyn Prompter>,
}

impl<'a> PortNegotiator<'a> {
    /// Negotiator that may offer an alternate port through `prompter`.
    pub fn interactive(prompter: &'a dyn Prompter) -> Self {
        Self {
            prompter: Some(prompter),
        }
    }

    /// Negotiator that never picks a port the operator did not ask for.
    pub fn non_interactive() -> Self {
        Self { prompter: None }
    }

    #[instrument(skip(self), fields(interactive = self.prompter.is_some()))]
    pub fn acquire(&self, host: &str, preferred: u16) -> Result<PortLease, TaskError> {
        let unavailable = |reason: String| TaskError::PortUnavailable {
            host: host.to_string(),
            port: preferred,
            reason,
        };

        match probe(host, preferred) {
            Ok(()) => {
                debug!(port = preferred, "preferred port is free");
                return Ok(PortLease::new(preferred));
            }
            Err(ProbeError::InUse) => {}
            Err(ProbeError::PermissionDenied) => {
                return Err(unavailable(format!(
                    "admin permissions are required to run a server on port {preferred}"
                )));
            }
            Err(ProbeError::Other(reason)) => return Err(unavailable(reason)),
        }

        let busy = format!("something is already running on port {preferred}");
        let Some(prompter) = self.prompter else {
            warn!(port = preferred, "preferred port in use, not interactive");
            return Err(unavailable(busy));
        };

        let Some(alternate) = next_free_port(host, preferred) else {
            return Err(unavailable(format!("{busy} and no higher port is free")));
        };

        let question = format!(
            "Something is already running on port {preferred}.\n\nWould you like to run the app on port {alternate} instead?"
        );
        let accepted = prompter
            .confirm(&question, true)
            .map_err(|err| unavailable(format!("{busy}; prompt failed: {err:#}")))?;
        if !accepted {
            return Err(unavailable(format!("{busy}; alternate port {alternate} declined")));
        }

        info!(preferred, port = alternate, "using alternate port");
        Ok(PortLease::new(alternate))
    }
}

/// Bind and immediately release `host:port`.
fn probe(host: &str, port: u16) -> Result<(), ProbeError> {
    match TcpListener::bind((host, port)) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(err) => match err.kind() {
            ErrorKind::AddrInUse => Err(ProbeError::InUse),
            ErrorKind::PermissionDenied => Err(ProbeError::PermissionDenied),
            _ => Err(ProbeError::Other(err.to_string())),
        },
    }
}

/// First port above `taken` that can be bound, skipping busy and privileged ones.
fn next_free_port(host: &str, taken: u16) -> Option<u16> {
    let start = taken.checked_add(1)?;
    (start..=u16::MAX).find(|port| probe(host, *port).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedPrompter;

    const HOST: &str = "127.0.0.1";

    fn occupied() -> (TcpListener, u16) {
        let listener = TcpListener::bind((HOST, 0)).expect("bind ephemeral");
        let port = listener.local_addr().expect("addr").port();
        (listener, port)
    }

    #[test]
    fn free_preferred_port_is_leased_without_prompting() {
        let (listener, port) = occupied();
        drop(listener);
        let prompter = ScriptedPrompter::new(vec![]);
        let lease = PortNegotiator::interactive(&prompter)
            .acquire(HOST, port)
            .expect("lease");
        assert_eq!(lease.port, port);
        assert!(prompter.questions().is_empty());
    }

    #[test]
    fn interactive_offers_a_higher_free_port() {
        let (_guard, port) = occupied();
        let prompter = ScriptedPrompter::new(vec![true]);
        let lease = PortNegotiator::interactive(&prompter)
            .acquire(HOST, port)
            .expect("lease");
        assert!(lease.port > port);
        assert!(TcpListener::bind((HOST, lease.port)).is_ok(), "probe socket left open");
        let questions = prompter.questions();
        assert_eq!(questions.len(), 1);
        assert!(questions[0].contains(&format!("port {port}")));
    }

    #[test]
    fn declined_prompt_is_unavailable() {
        let (_guard, port) = occupied();
        let prompter = ScriptedPrompter::new(vec![false]);
        let err = PortNegotiator::interactive(&prompter)
            .acquire(HOST, port)
            .expect_err("declined");
        assert!(matches!(err, TaskError::PortUnavailable { port: p, .. } if p == port));
    }

    #[test]
    fn non_interactive_fails_on_busy_port() {
        let (_guard, port) = occupied();
        let err = PortNegotiator::non_interactive()
            .acquire(HOST, port)
            .expect_err("busy");
        match err {
            TaskError::PortUnavailable { host, port: p, reason } => {
                assert_eq!(host, HOST);
                assert_eq!(p, port);
                assert!(reason.contains("already running"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
