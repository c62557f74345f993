//! Tokio driver for a [`WindowSwitch`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{WindowOutput, WindowSwitch};
use crate::engine::Engine;
use crate::scheduler::runner::sleep_until;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WindowEvent {
    Output {
        window: String,
        output: WindowOutput,
    },
    Failed {
        window: String,
        error: String,
        at: DateTime<Utc>,
    },
    Closed {
        window: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug)]
enum WindowCommand {
    Input(Value),
    Close,
}

/// Owner of a running window task. Dropping it aborts the task.
#[derive(Debug)]
pub struct WindowHandle {
    name: String,
    commands: mpsc::UnboundedSender<WindowCommand>,
    task: Option<JoinHandle<()>>,
}

impl WindowHandle {
    pub fn spawn(
        engine: Arc<Engine>,
        switch: WindowSwitch,
        events: mpsc::UnboundedSender<WindowEvent>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let name = switch.name().to_string();
        let task = tokio::spawn(run(engine, switch, rx, events));
        Self {
            name,
            commands,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route one message. `false` once the task has stopped.
    pub fn input(&self, message: Value) -> bool {
        self.commands.send(WindowCommand::Input(message)).is_ok()
    }

    /// Cancel the pending resend and wait for the task to stop.
    pub async fn close(mut self) {
        if self.commands.send(WindowCommand::Close).is_err() {
            debug!(window = %self.name, "window task already stopped");
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                debug!(window = %self.name, %err, "window task ended abnormally");
            }
        }
    }
}

impl Drop for WindowHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn route(
    engine: &Engine,
    switch: &mut WindowSwitch,
    message: Value,
    resent: bool,
) -> WindowEvent {
    let window = switch.name().to_string();
    match switch.evaluate(engine, message, resent) {
        Ok(output) => WindowEvent::Output { window, output },
        Err(err) => {
            error!(%window, %err, "window could not be evaluated");
            WindowEvent::Failed {
                window,
                error: err.to_string(),
                at: engine.now(),
            }
        }
    }
}

async fn run(
    engine: Arc<Engine>,
    mut switch: WindowSwitch,
    mut commands: mpsc::UnboundedReceiver<WindowCommand>,
    events: mpsc::UnboundedSender<WindowEvent>,
) {
    loop {
        let deadline = switch.pending_resend();
        let event = tokio::select! {
            _ = sleep_until(&engine, deadline) => {
                let now = match deadline {
                    Some(at) => engine.now().max(at),
                    None => engine.now(),
                };
                match switch.take_due_resend(now) {
                    Some(message) => route(&engine, &mut switch, message, true),
                    None => continue,
                }
            }
            command = commands.recv() => match command {
                Some(WindowCommand::Input(message)) => route(&engine, &mut switch, message, false),
                Some(WindowCommand::Close) | None => {
                    switch.cancel();
                    let closed = WindowEvent::Closed {
                        window: switch.name().to_string(),
                        at: engine.now(),
                    };
                    if events.send(closed).is_err() {
                        debug!(window = %switch.name(), "window event receiver dropped before close");
                    }
                    break;
                }
            }
        };
        if events.send(event).is_err() {
            debug!(window = %switch.name(), "window event receiver dropped");
        }
    }
}
