// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::StreamExt;
use hivemind_agents::{build_agent, Agent};
use hivemind_config::{default_model_for, AgentRole, ModelKind, RoleTable, Settings};
use hivemind_history::SessionStore;
use hivemind_protocol::{Event, OutputEvent};
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tracing::{error, warn};

struct Pane {
    role: AgentRole,
    agent: Arc<Mutex<Box<dyn Agent>>>,
}

/// Owns the six fixed agent panes and routes commands to them. Each pane's
/// agent is behind its own `Mutex` rather than the whole map being behind
/// one lock, so `broadcast` can hold six independent locks concurrently
/// instead of serializing every pane behind a single map-wide guard.
pub struct Manager {
    workspace: PathBuf,
    panes: HashMap<String, Pane>,
    session_path: PathBuf,
}

impl Manager {
    /// Builds all six agents, attempts resume where the provider supports
    /// it, and reports startup progress on `out`. Per-agent connect
    /// failures are isolated: one agent failing to connect does not stop
    /// the others from starting.
    pub async fn start(workspace: PathBuf, out: &UnboundedSender<OutputEvent>) -> Self {
        let session_path = workspace.join("session-state.json");
        let sessions = SessionStore::load(&session_path);
        let settings = Settings::load(&workspace);

        let mut panes = HashMap::new();
        let mut started = Vec::new();

        for mut role in RoleTable::canonical() {
            let pane_id = role.pane_id.as_str().to_string();
            if let Some(override_kind) = settings.model_kind_override(&pane_id) {
                role.model_kind = override_kind;
                role.model = default_model_for(override_kind).to_string();
            }
            let role_name = role.role_name.clone();
            let resume_id = match role.model_kind {
                ModelKind::Codex => sessions.get(&pane_id).cloned(),
                ModelKind::Claude | ModelKind::Gemini => None,
            };

            let mut agent = build_agent(role.clone(), workspace.clone());
            match agent.connect(resume_id).await {
                Ok(()) => {
                    let _ = out.send(OutputEvent::for_pane(
                        &pane_id,
                        &role_name,
                        Event::Status { state: "connected".to_string(), detail: None },
                    ));
                    let _ = out.send(OutputEvent::for_pane(
                        &pane_id,
                        &role_name,
                        Event::AgentStarted { session_id: agent.session_id().map(str::to_string) },
                    ));
                    started.push(pane_id.clone());
                }
                Err(e) => {
                    error!(pane_id = %pane_id, role = %role_name, error = %e, "agent failed to connect");
                    let _ = out.send(OutputEvent::for_pane(
                        &pane_id,
                        &role_name,
                        Event::Error { message: e.to_string(), error_type: "connect".to_string() },
                    ));
                }
            }
            panes.insert(pane_id, Pane { role, agent: Arc::new(Mutex::new(agent)) });
        }

        let _ = out.send(OutputEvent::manager(Event::Ready { agents: started }));

        Self { workspace, panes, session_path }
    }

    /// Pane ids in sorted ("1".."6") order, for `broadcast` fan-out and the
    /// dispatcher's `ping` re-sync.
    pub(crate) fn pane_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.panes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Sends one message to a single pane, streaming its normalized events
    /// onto `out` tagged with the pane id and role.
    pub async fn send_message(&self, pane_id: &str, message: &str, out: &UnboundedSender<OutputEvent>) {
        let Some(pane) = self.panes.get(pane_id) else {
            let _ = out.send(OutputEvent::manager(Event::Error {
                message: format!("unknown pane: {pane_id}"),
                error_type: "protocol".to_string(),
            }));
            return;
        };
        let role_name = pane.role.role_name.clone();
        let agent = pane.agent.clone();
        let message = message.to_string();
        let pane_id = pane_id.to_string();

        let _ = out.send(OutputEvent::for_pane(
            &pane_id,
            &role_name,
            Event::MessageReceived { message: message.clone() },
        ));

        let mut agent = agent.lock().await;
        let mut stream = agent.send(&message);
        while let Some(event) = stream.next().await {
            let _ = out.send(OutputEvent::for_pane(&pane_id, &role_name, event));
        }
    }

    /// Fans a message out to every pane except those in `exclude`,
    /// concurrently: each pane's lock and event stream progress
    /// independently of the others, so a slow provider on one pane never
    /// blocks the rest.
    pub async fn broadcast(&self, message: &str, exclude: &[String], out: &UnboundedSender<OutputEvent>) {
        let targets: Vec<String> = self.pane_ids().into_iter().filter(|p| !exclude.contains(p)).collect();
        let sends = targets.iter().map(|pane_id| self.send_message(pane_id, message, out));
        futures::future::join_all(sends).await;
    }

    /// Restarts a single pane in place. Takes `&self`, not `&mut self`: the
    /// replacement agent is written back into the pane's own `Mutex` slot
    /// rather than by replacing the map entry, so this can run concurrently
    /// with `send_message`/`broadcast` on every *other* pane without any
    /// manager-wide lock — only this pane's slot is briefly held.
    pub async fn restart_agent(&self, pane_id: &str, out: &UnboundedSender<OutputEvent>) {
        let Some(pane) = self.panes.get(pane_id) else {
            let _ = out.send(OutputEvent::manager(Event::Error {
                message: format!("unknown pane: {pane_id}"),
                error_type: "protocol".to_string(),
            }));
            return;
        };
        let role = pane.role.clone();
        let role_name = role.role_name.clone();

        let mut slot = pane.agent.lock().await;
        let _ = slot.disconnect().await;
        let _ = out.send(OutputEvent::for_pane(
            pane_id,
            &role_name,
            Event::Status { state: "disconnected".to_string(), detail: None },
        ));

        let mut fresh = build_agent(role, self.workspace.clone());
        let result = fresh.connect(None).await;
        *slot = fresh;
        drop(slot);

        match result {
            Ok(()) => {
                let _ = out.send(OutputEvent::for_pane(
                    pane_id,
                    &role_name,
                    Event::Status { state: "connected".to_string(), detail: None },
                ));
                let _ = out.send(OutputEvent::for_pane(pane_id, &role_name, Event::AgentRestarted {}));
                let _ = out.send(OutputEvent::for_pane(
                    pane_id,
                    &role_name,
                    Event::Status { state: "idle".to_string(), detail: Some("Restarted".to_string()) },
                ));
            }
            Err(e) => {
                let _ = out.send(OutputEvent::for_pane(
                    pane_id,
                    &role_name,
                    Event::Error { message: e.to_string(), error_type: "connect".to_string() },
                ));
            }
        }
    }

    pub async fn interrupt_agent(&self, pane_id: &str, out: &UnboundedSender<OutputEvent>) {
        let Some(pane) = self.panes.get(pane_id) else {
            let _ = out.send(OutputEvent::manager(Event::Error {
                message: format!("unknown pane: {pane_id}"),
                error_type: "protocol".to_string(),
            }));
            return;
        };
        let role_name = pane.role.role_name.clone();
        let mut agent = pane.agent.lock().await;
        if agent.interrupt().await {
            let _ = out.send(OutputEvent::for_pane(pane_id, &role_name, Event::Interrupted {}));
        } else {
            let _ = out.send(OutputEvent::for_pane(
                pane_id,
                &role_name,
                Event::Warning { message: "this provider does not support interrupt".to_string() },
            ));
        }
    }

    pub async fn get_sessions(&self) -> serde_json::Value {
        let mut sessions = serde_json::Map::new();
        for (pane_id, pane) in self.panes.iter() {
            let agent = pane.agent.lock().await;
            sessions.insert(pane_id.clone(), serde_json::json!(agent.session_id()));
        }
        serde_json::Value::Object(sessions)
    }

    /// Disconnects every agent, persists whichever session tokens they
    /// returned, and reports how many were saved.
    pub async fn stop_all(&self, out: &UnboundedSender<OutputEvent>) {
        let mut sessions = SessionStore::load(&self.session_path);
        for (pane_id, pane) in self.panes.iter() {
            let mut agent = pane.agent.lock().await;
            if let Some(token) = agent.disconnect().await {
                sessions.insert(pane_id.clone(), token);
            }
            let _ = out.send(OutputEvent::for_pane(
                pane_id,
                &pane.role.role_name,
                Event::Status { state: "disconnected".to_string(), detail: None },
            ));
        }
        if let Err(e) = SessionStore::save(&self.session_path, &sessions) {
            warn!(error = %e, "could not persist session state on shutdown");
        }
        let _ = out.send(OutputEvent::manager(Event::AllStopped { sessions_saved: sessions.len() }));
    }
}
