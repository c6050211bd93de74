//! Outbound device commands
//!
//! The commands each device type accepts come from the `[[devices]]` config
//! table and are compiled once into a `(device_type, command) → sender` map.
//! `send` publishes immediately; `send_ordered` goes through a [`SerialQueue`]
//! so a sequence of commands leaves one at a time, in submission order.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::queue::{QueueConfig, QueuedTask, SerialQueue};

/// Transport side of outbound commands.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn publish_command(
        &self,
        device_type: &str,
        device_id: &str,
        command: &str,
        payload: &Value,
    ) -> anyhow::Result<()>;
}

/// Sink that only logs; the default when no device transport is attached.
#[derive(Debug, Default)]
pub struct TracingCommandSink;

#[async_trait]
impl CommandSink for TracingCommandSink {
    async fn publish_command(
        &self,
        device_type: &str,
        device_id: &str,
        command: &str,
        payload: &Value,
    ) -> anyhow::Result<()> {
        info!(device_type, device_id, command, payload = %payload, "Command published");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCommand {
    pub device_type: String,
    pub device_id: String,
    pub command: String,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("device type '{device_type}' has no command '{command}'")]
    UnknownCommand { device_type: String, command: String },
    #[error("command publish failed: {0:#}")]
    Publish(anyhow::Error),
}

/// How an ordered command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Sent,
    Failed(String),
    /// Removed by `cancel_pending` before it was sent
    Canceled,
}

type CommandFn = Arc<dyn Fn(String, Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub struct CommandDispatcher {
    commands: HashMap<(String, String), CommandFn>,
    queue: SerialQueue<OutboundCommand, ()>,
}

impl CommandDispatcher {
    pub fn from_config(devices: &[DeviceConfig], sink: Arc<dyn CommandSink>, queue_config: QueueConfig) -> Self {
        let mut commands: HashMap<(String, String), CommandFn> = HashMap::new();
        for device in devices {
            for command in &device.commands {
                let sink = Arc::clone(&sink);
                let device_type = device.device_type.clone();
                let name = command.name.clone();
                let send: CommandFn = Arc::new(move |device_id: String, payload: Value| {
                    let sink = Arc::clone(&sink);
                    let device_type = device_type.clone();
                    let name = name.clone();
                    async move {
                        sink.publish_command(&device_type, &device_id, &name, &payload)
                            .await
                    }
                    .boxed()
                });
                commands.insert((device.device_type.clone(), command.name.clone()), send);
            }
        }
        debug!(commands = commands.len(), "Command dispatcher built");
        Self {
            commands,
            queue: SerialQueue::new(queue_config),
        }
    }

    /// Configured command names for a device type, sorted.
    pub fn commands_for(&self, device_type: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .commands
            .keys()
            .filter(|(dt, _)| dt == device_type)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, device_type: &str, command: &str) -> Result<CommandFn, CommandError> {
        self.commands
            .get(&(device_type.to_string(), command.to_string()))
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand {
                device_type: device_type.to_string(),
                command: command.to_string(),
            })
    }

    /// Publish a command now.
    pub async fn send(
        &self,
        device_type: &str,
        device_id: &str,
        command: &str,
        payload: Value,
    ) -> Result<(), CommandError> {
        let send = self.lookup(device_type, command)?;
        send(device_id.to_string(), payload)
            .await
            .map_err(CommandError::Publish)
    }

    /// Queue a command behind every previously ordered one.
    ///
    /// Unknown commands are rejected before queueing. The receiver resolves
    /// once the command was sent, failed, or was canceled.
    pub fn send_ordered(&self, command: OutboundCommand) -> Result<oneshot::Receiver<CommandOutcome>, CommandError> {
        let send = self.lookup(&command.device_type, &command.command)?;
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let notify = move |outcome: CommandOutcome| {
            let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sender) = sender {
                let _ = sender.send(outcome);
            }
        };
        let (on_done, on_error, on_canceled) = (notify.clone(), notify.clone(), notify);

        self.queue.push(
            QueuedTask::new(command, move |cmd: OutboundCommand| send(cmd.device_id, cmd.payload))
                .on_done(move |()| on_done(CommandOutcome::Sent))
                .on_error(move |e| on_error(CommandOutcome::Failed(e.to_string())))
                .on_canceled(move |cmd| {
                    debug!(device_id = %cmd.device_id, command = %cmd.command, "Ordered command canceled");
                    on_canceled(CommandOutcome::Canceled);
                }),
        );
        Ok(rx)
    }

    /// Cancel every ordered command that has not started. Returns how many.
    pub fn cancel_pending(&self) -> usize {
        self.queue.clear()
    }

    /// Ordered commands waiting to be sent.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
