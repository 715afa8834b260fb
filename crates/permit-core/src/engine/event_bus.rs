//! Broadcast channel for permit events.

use permit_types::PermitEvent;
use tokio::sync::broadcast;

/// Fan-out of [`PermitEvent`]s to any number of subscribers.
///
/// Publishing with no subscribers is not an error worth surfacing; callers
/// discard the result.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PermitEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per slow subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PermitEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: PermitEvent,
	) -> Result<usize, broadcast::error::SendError<PermitEvent>> {
		self.sender.send(event)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1024)
	}
}
