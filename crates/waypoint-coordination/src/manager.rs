//! The coordination manager: one message queue, a handle to shared state,
//! and conflict detection and resolution over outstanding resource requests.
//!
//! The manager never holds the queue lock and the shared-state lock at the
//! same time: every call reads or writes one structure, releases it, then
//! touches the other.

use std::sync::Arc;

use tracing::{debug, warn};
use waypoint_types::{AgentId, Message, MessageKind};

use crate::conflict::{Conflict, ResolverRegistry, ResourceClaim, detect_resource_conflicts};
use crate::error::CoordinationError;
use crate::queue::MessageQueue;
use crate::shared_state::SharedState;

/// Routes messages between actors and arbitrates shared resources.
#[derive(Debug)]
pub struct CoordinationManager {
    /// The message queue.
    queue: MessageQueue,
    /// Pool, ledger, capabilities, tasks, and metrics.
    shared: Arc<SharedState>,
    /// Conflict resolvers by type.
    resolvers: ResolverRegistry,
}

impl CoordinationManager {
    /// Create a manager with the default resolvers.
    pub fn new(queue: MessageQueue, shared: Arc<SharedState>) -> Self {
        Self {
            queue,
            shared,
            resolvers: ResolverRegistry::with_defaults(),
        }
    }

    /// The message queue.
    pub const fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// The shared state.
    pub const fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Mutable access to the resolver registry for custom resolvers.
    pub const fn resolvers_mut(&mut self) -> &mut ResolverRegistry {
        &mut self.resolvers
    }

    /// Enqueue a message. Returns `false` if the queue is full.
    pub fn send_message(&self, message: Message) -> bool {
        self.queue.enqueue(message)
    }

    /// Send a broadcast report from `sender`.
    pub fn broadcast(&self, sender: AgentId, content: impl Into<String>) -> bool {
        self.queue.enqueue(Message::new(sender, content))
    }

    /// Drain every message currently deliverable to `agent`, in dequeue
    /// order.
    pub fn get_messages_for_agent(&self, agent: AgentId) -> Vec<Message> {
        std::iter::from_fn(|| self.queue.dequeue(agent)).collect()
    }

    /// Try to satisfy a resource request immediately.
    ///
    /// Returns the reply addressed to the requester: a
    /// [`MessageKind::ResourceAllocation`] on success, or a
    /// [`MessageKind::Error`] when the pool is short or the request is
    /// malformed.
    pub fn handle_resource_request(&self, request: &Message) -> Message {
        let claim = match ResourceClaim::from_message(request) {
            Ok(claim) => claim,
            Err(err) => {
                debug!(message_id = %request.id, %err, "Rejecting resource request");
                return Message::new(AgentId::COORDINATOR, format!("Resource request rejected: {err}"))
                    .to(request.sender)
                    .with_kind(MessageKind::Error)
                    .in_reply_to(request.id);
            }
        };

        let reply = if self.shared.allocate_resource(claim.agent, claim.kind, claim.amount) {
            Message::new(
                AgentId::COORDINATOR,
                format!("Resource allocated: {} {}", claim.amount, claim.kind),
            )
            .with_kind(MessageKind::ResourceAllocation)
            .with_metadata("amount", claim.amount.to_string())
        } else {
            Message::new(
                AgentId::COORDINATOR,
                format!("Resource allocation failed: insufficient {}", claim.kind),
            )
            .with_kind(MessageKind::Error)
            .with_metadata("requested", claim.amount.to_string())
        };
        reply
            .to(request.sender)
            .in_reply_to(request.id)
            .with_metadata("resource_type", claim.kind.as_str())
    }

    /// Outstanding resource requests still on the queue, as claims.
    /// Malformed requests are skipped.
    pub fn outstanding_claims(&self) -> Vec<ResourceClaim> {
        self.queue
            .queued_of_kind(MessageKind::ResourceRequest)
            .iter()
            .filter_map(|message| ResourceClaim::from_message(message).ok())
            .collect()
    }

    /// Flag every resource kind whose outstanding demand exceeds the pool.
    pub fn detect_conflicts(&self) -> Vec<Conflict> {
        let claims = self.outstanding_claims();
        if claims.is_empty() {
            return Vec::new();
        }
        let pool = self.shared.pool();
        detect_resource_conflicts(&claims, &pool)
    }

    /// Detect conflicts, run the registered resolver for each, enqueue the
    /// follow-up messages, and drop the resolved requests from the queue.
    ///
    /// Returns the conflicts that were resolved.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::UnknownResolver`] if a conflict has no
    /// registered resolver. Conflicts resolved before it keep their effects.
    pub fn resolve_conflicts(&self) -> Result<Vec<Conflict>, CoordinationError> {
        let conflicts = self.detect_conflicts();
        for conflict in &conflicts {
            let followups = self.resolvers.resolve(conflict, &self.shared)?;
            let handled: Vec<_> = conflict.claims.iter().map(|claim| claim.message_id).collect();
            self.queue.remove(&handled);
            for message in followups {
                if !self.queue.enqueue(message) {
                    warn!(conflict_type = %conflict.conflict_type, "Queue full, follow-up dropped");
                }
            }
        }
        Ok(conflicts)
    }

    /// Resolve conflicts, then answer every resource request still on the
    /// queue through [`Self::handle_resource_request`]. Requests are taken
    /// off the queue and the replies enqueued in their place.
    ///
    /// Returns the replies that were sent.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::resolve_conflicts`] failures. Requests are left
    /// queued in that case.
    pub fn process_resource_requests(&self) -> Result<Vec<Message>, CoordinationError> {
        self.resolve_conflicts()?;
        let requests = self.queue.queued_of_kind(MessageKind::ResourceRequest);
        let ids: Vec<_> = requests.iter().map(|request| request.id).collect();
        self.queue.remove(&ids);

        let mut replies = Vec::with_capacity(requests.len());
        for request in &requests {
            let reply = self.handle_resource_request(request);
            if !self.queue.enqueue(reply.clone()) {
                warn!(message_id = %request.id, "Queue full, resource reply dropped");
            }
            replies.push(reply);
        }
        Ok(replies)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use waypoint_types::{Priority, ResourceKind};

    use super::*;

    fn manager(energy: u32) -> CoordinationManager {
        let shared = Arc::new(SharedState::new(&BTreeMap::from([(
            ResourceKind::Energy,
            energy,
        )])));
        CoordinationManager::new(MessageQueue::default(), shared)
    }

    fn request(agent: AgentId, amount: u32) -> Message {
        Message::new(agent, "need energy")
            .with_kind(MessageKind::ResourceRequest)
            .with_metadata("resource_type", "energy")
            .with_metadata("amount", amount.to_string())
    }

    #[test]
    fn drains_all_messages_for_agent() {
        let mgr = manager(0);
        let a = AgentId::new();
        let b = AgentId::new();
        mgr.send_message(Message::new(b, "one").to(a));
        mgr.send_message(Message::new(b, "two").to(a));
        mgr.send_message(Message::new(a, "for b").to(b));
        mgr.broadcast(b, "all hands");

        let inbox = mgr.get_messages_for_agent(a);
        assert_eq!(inbox.len(), 3);
        assert_eq!(mgr.queue().len(), 1);
    }

    #[test]
    fn resource_request_granted_and_denied() {
        let mgr = manager(20);
        let a = AgentId::new();
        let req = request(a, 15);
        let reply = mgr.handle_resource_request(&req);
        assert_eq!(reply.kind, MessageKind::ResourceAllocation);
        assert_eq!(reply.recipient, Some(a));
        assert_eq!(reply.parent_id, Some(req.id));

        let reply = mgr.handle_resource_request(&request(a, 15));
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(mgr.shared().available(ResourceKind::Energy), 5);
    }

    #[test]
    fn malformed_request_gets_error_reply() {
        let mgr = manager(20);
        let a = AgentId::new();
        let reply = mgr.handle_resource_request(&Message::new(a, "gimme"));
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(mgr.shared().available(ResourceKind::Energy), 20);
    }

    #[test]
    fn resolve_conflicts_grants_by_priority() {
        let mgr = manager(50);
        let low = AgentId::new();
        let high = AgentId::new();
        mgr.send_message(request(low, 40).with_priority(Priority::Low));
        mgr.send_message(request(high, 40).with_priority(Priority::Urgent));

        assert_eq!(mgr.detect_conflicts().len(), 1);
        let resolved = mgr.resolve_conflicts();
        assert!(resolved.is_ok_and(|c| c.len() == 1));

        assert!(mgr.detect_conflicts().is_empty());
        assert!(mgr.queue().queued_of_kind(MessageKind::ResourceRequest).is_empty());
        assert_eq!(mgr.shared().available(ResourceKind::Energy), 10);
        let inbox = mgr.get_messages_for_agent(high);
        assert!(inbox.iter().any(|m| m.content.starts_with("RESOURCE_GRANTED")));
    }

    #[test]
    fn process_requests_answers_each_requester() {
        let mgr = manager(30);
        let a = AgentId::new();
        let b = AgentId::new();
        mgr.send_message(request(a, 10));
        mgr.send_message(request(b, 10));

        let replies = mgr.process_resource_requests().unwrap();
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r.kind == MessageKind::ResourceAllocation));
        assert!(mgr.queue().queued_of_kind(MessageKind::ResourceRequest).is_empty());
        assert_eq!(mgr.shared().available(ResourceKind::Energy), 10);
        assert_eq!(mgr.get_messages_for_agent(a).len(), 1);
    }
}
