//! Status change events and notifiers.
//!
//! Every status change made by the service is reported after it has been
//! persisted, so consumers can refresh views, send notifications, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use trellis_store::NodeStatus;

/// What caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
  /// The node itself was completed.
  Completed,
  /// All predecessors of the node completed.
  Unlocked,
  /// The node itself was rolled back.
  RolledBack,
  /// An ancestor was rolled back.
  Reset,
}

/// One status change of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
  pub task_id: String,
  pub node_id: String,
  pub from: NodeStatus,
  pub to: NodeStatus,
  pub cause: Cause,
}

/// Trait for receiving status events.
///
/// The service calls `notify` once per changed node, in the order the
/// changes were made.
pub trait StatusNotifier: Send + Sync {
  fn notify(&self, event: StatusEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl StatusNotifier for NoopNotifier {
  fn notify(&self, _event: StatusEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never holds a task lock open.
  sender: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<StatusEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl StatusNotifier for ChannelNotifier {
  fn notify(&self, event: StatusEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
