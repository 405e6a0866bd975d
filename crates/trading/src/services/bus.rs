//! Outbound message bus trait and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::TradingError;
use crate::messages::{CommandKind, TradingCommand};

/// Sends commands to logical destinations on the message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Hands a command to the bus for delivery to `destination`.
    async fn send(&self, destination: &str, command: &TradingCommand) -> Result<(), TradingError>;
}

/// A command recorded by [`InMemoryMessageBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub destination: String,
    pub command: TradingCommand,
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    sent: Vec<SentCommand>,
    failing_sends: usize,
}

/// In-memory message bus that records every command it is given.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryMessageBus {
    /// Creates a new in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail.
    pub async fn fail_next_sends(&self, count: usize) {
        self.state.write().await.failing_sends = count;
    }

    /// Returns every command sent so far, in order.
    pub async fn sent(&self) -> Vec<SentCommand> {
        self.state.read().await.sent.clone()
    }

    /// Returns how many commands of a kind have been sent.
    pub async fn count_of(&self, kind: CommandKind) -> usize {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|s| s.command.kind() == kind)
            .count()
    }

    /// Returns the commands sent to a destination.
    pub async fn sent_to(&self, destination: &str) -> Vec<TradingCommand> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|s| s.destination == destination)
            .map(|s| s.command.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn send(&self, destination: &str, command: &TradingCommand) -> Result<(), TradingError> {
        let mut state = self.state.write().await;

        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(TradingError::Bus(format!(
                "broker rejected {} for {destination}",
                command.kind()
            )));
        }

        state.sent.push(SentCommand {
            destination: destination.to_string(),
            command: command.clone(),
        });
        Ok(())
    }
}
