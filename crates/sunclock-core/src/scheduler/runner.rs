//! Tokio driver for a [`Schedule`].
//!
//! One task per schedule sleeps until the earliest pending deadline or the
//! next command, whichever comes first. Dropping the handle aborts the task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::{RearmReason, Schedule};
use crate::engine::Engine;
use crate::events::ScheduleEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleCommand {
    /// Replace the input message and re-arm.
    SetContext(Value),
    Rearm,
    Close,
}

/// Owner of a running schedule task.
#[derive(Debug)]
pub struct ScheduleHandle {
    id: Uuid,
    name: String,
    commands: mpsc::UnboundedSender<ScheduleCommand>,
    task: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    /// Arm `schedule` and keep it running on the current tokio runtime.
    ///
    /// Every [`ScheduleEvent`] is sent to `events`; a dropped receiver
    /// does not stop the schedule.
    pub fn spawn(
        engine: Arc<Engine>,
        schedule: Schedule,
        events: mpsc::UnboundedSender<ScheduleEvent>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let id = schedule.id();
        let name = schedule.name().to_string();
        let task = tokio::spawn(run(engine, schedule, rx, events));
        Self {
            id,
            name,
            commands,
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` once the task has stopped.
    pub fn send(&self, command: ScheduleCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn set_context(&self, message: Value) -> bool {
        self.send(ScheduleCommand::SetContext(message))
    }

    pub fn rearm(&self) -> bool {
        self.send(ScheduleCommand::Rearm)
    }

    /// Cancel every timer and wait for the task to emit `Closed` and stop.
    pub async fn close(mut self) {
        self.send(ScheduleCommand::Close);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                debug!(schedule = %self.name, %err, "schedule task ended abnormally");
            }
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<ScheduleEvent>, batch: Vec<ScheduleEvent>) {
    for event in batch {
        if events.send(event).is_err() {
            debug!("schedule event receiver dropped");
        }
    }
}

/// Sleep until `deadline` on the engine's clock; forever without one.
pub(crate) async fn sleep_until(engine: &Engine, deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(at) => {
            let delay = (at - engine.now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run(
    engine: Arc<Engine>,
    mut schedule: Schedule,
    mut commands: mpsc::UnboundedReceiver<ScheduleCommand>,
    events: mpsc::UnboundedSender<ScheduleEvent>,
) {
    emit(&events, schedule.arm(&engine, engine.now()));

    loop {
        let deadline = schedule.next_deadline();
        tokio::select! {
            _ = sleep_until(&engine, deadline) => {
                let now = match deadline {
                    Some(at) => engine.now().max(at),
                    None => engine.now(),
                };
                emit(&events, schedule.tick(&engine, now));
            }
            command = commands.recv() => {
                let now = engine.now();
                match command {
                    Some(ScheduleCommand::SetContext(message)) => {
                        schedule.set_context(message);
                        emit(&events, schedule.rearm(&engine, now, RearmReason::Context));
                    }
                    Some(ScheduleCommand::Rearm) => {
                        emit(&events, schedule.rearm(&engine, now, RearmReason::Manual));
                    }
                    Some(ScheduleCommand::Close) | None => {
                        emit(&events, schedule.close(now));
                        break;
                    }
                }
            }
        }
    }
}
