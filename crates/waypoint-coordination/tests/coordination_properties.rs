//! Integration tests for queue ordering and allocation conservation,
//! including concurrent allocators.
#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use waypoint_coordination::{MessageQueue, SharedState};
use waypoint_types::{AgentId, Message, Priority, ResourceKind};

const PRIORITIES: [Priority; 4] = [Priority::Low, Priority::Normal, Priority::High, Priority::Urgent];

#[test]
fn pool_scenario() {
    let shared = SharedState::new(&BTreeMap::from([(ResourceKind::Materials, 100)]));
    let a = AgentId::new();
    let b = AgentId::new();

    assert!(shared.allocate_resource(a, ResourceKind::Materials, 30));
    assert_eq!(shared.available(ResourceKind::Materials), 70);
    assert!(!shared.allocate_resource(b, ResourceKind::Materials, 80));
    assert_eq!(shared.available(ResourceKind::Materials), 70);
    shared.release_resource(a, ResourceKind::Materials, 20);
    assert_eq!(shared.available(ResourceKind::Materials), 90);
}

#[test]
fn concurrent_allocations_never_oversubscribe() {
    let shared = Arc::new(SharedState::new(&BTreeMap::from([(ResourceKind::Energy, 100)])));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let agent = AgentId::new();
                let mut granted = 0_u32;
                for _ in 0..20 {
                    if shared.allocate_resource(agent, ResourceKind::Energy, 3) {
                        granted += 3;
                    }
                    if granted > 6 {
                        granted -= shared.release_resource(agent, ResourceKind::Energy, 2);
                    }
                }
                granted
            })
        })
        .collect();

    let held: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(held + shared.available(ResourceKind::Energy), 100);
    assert!(shared.audit().is_balanced());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn allocation_conserves_pool(
        initial in 0..500_u32,
        ops in prop::collection::vec((0..3_usize, any::<bool>(), 0..120_u32), 1..60),
    ) {
        let shared = SharedState::new(&BTreeMap::from([(ResourceKind::Materials, initial)]));
        let agents = [AgentId::new(), AgentId::new(), AgentId::new()];

        for (who, allocate, amount) in ops {
            let agent = agents[who];
            if allocate {
                let before = shared.available(ResourceKind::Materials);
                let ok = shared.allocate_resource(agent, ResourceKind::Materials, amount);
                prop_assert_eq!(ok, amount <= before);
            } else {
                shared.release_resource(agent, ResourceKind::Materials, amount);
            }

            let held: u32 = agents
                .iter()
                .map(|a| shared.get_agent_resources(*a).get(&ResourceKind::Materials).copied().unwrap_or(0))
                .sum();
            prop_assert_eq!(shared.available(ResourceKind::Materials) + held, initial);
        }
    }

    #[test]
    fn dequeue_respects_priority_then_arrival(choices in prop::collection::vec(0..4_usize, 1..40)) {
        let queue = MessageQueue::default();
        let agent = AgentId::new();
        for (index, choice) in choices.iter().enumerate() {
            queue.enqueue(Message::new(agent, index.to_string()).with_priority(PRIORITIES[*choice]));
        }

        let drained: Vec<(Priority, usize)> = std::iter::from_fn(|| queue.dequeue(agent))
            .map(|m| (m.priority, m.content.parse().unwrap()))
            .collect();
        prop_assert_eq!(drained.len(), choices.len());
        for pair in drained.windows(2) {
            let (p1, i1) = pair[0];
            let (p2, i2) = pair[1];
            prop_assert!(p1 > p2 || (p1 == p2 && i1 < i2));
        }
    }
}
