// Replication contract between the authoritative session and its observers.
//
// `ReplicationChannel` is the transport seam: broadcast to every attached
// observer, send to one, detach one. Observers are attached by the transport
// (which owns the sockets) and detached by the session when it drops a
// connection, so an observer's lifetime is always explicit.
//
// `Replicator` sits on top and owns the delta sequence. Every authoritative
// mutation goes out through `broadcast_delta` exactly once, stamped with the
// next `DeltaSeq`. Snapshots carry the current seq without advancing it, so
// two resyncs with no mutation in between are byte-identical. Observers
// never rely on having seen every delta: they resync on attach and on any
// sequence gap.
//
// `MemoryChannel` records outbound messages per observer for tests and for
// embedding the coordinator without a network.

use std::collections::BTreeMap;

use skirmish_protocol::{ConnectionId, DeltaSeq, ServerMessage, SessionSnapshot, StateDelta};

pub trait ReplicationChannel: Send {
    /// Deliver to every attached observer.
    fn broadcast(&mut self, msg: &ServerMessage);

    /// Deliver to one observer. Unknown observers are ignored.
    fn send_to(&mut self, observer: ConnectionId, msg: &ServerMessage);

    /// Stop delivering to `observer` and release its resources.
    fn detach(&mut self, observer: ConnectionId);
}

pub struct Replicator<C> {
    channel: C,
    seq: DeltaSeq,
}

impl<C: ReplicationChannel> Replicator<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            seq: DeltaSeq(0),
        }
    }

    /// Sequence number of the most recent delta.
    pub fn seq(&self) -> DeltaSeq {
        self.seq
    }

    /// Stamp `delta` with the next sequence number and broadcast it.
    pub fn broadcast_delta(&mut self, delta: StateDelta) -> DeltaSeq {
        self.seq = self.seq.next();
        let msg = ServerMessage::Delta {
            seq: self.seq,
            delta,
        };
        self.channel.broadcast(&msg);
        self.seq
    }

    /// Send a full snapshot to one observer.
    pub fn broadcast_full(&mut self, observer: ConnectionId, snapshot: SessionSnapshot) {
        self.channel
            .send_to(observer, &ServerMessage::Snapshot(snapshot));
    }

    /// Send a targeted notice (welcome or rejection) to one observer.
    pub fn notify(&mut self, observer: ConnectionId, msg: &ServerMessage) {
        self.channel.send_to(observer, msg);
    }

    pub fn detach(&mut self, observer: ConnectionId) {
        self.channel.detach(observer);
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

/// In-memory channel: one inbox per attached observer.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inboxes: BTreeMap<ConnectionId, Vec<ServerMessage>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, observer: ConnectionId) {
        self.inboxes.entry(observer).or_default();
    }

    pub fn is_attached(&self, observer: ConnectionId) -> bool {
        self.inboxes.contains_key(&observer)
    }

    /// Drain everything delivered to `observer` so far.
    pub fn take(&mut self, observer: ConnectionId) -> Vec<ServerMessage> {
        self.inboxes
            .get_mut(&observer)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Drain and keep only the deltas, in order.
    pub fn take_deltas(&mut self, observer: ConnectionId) -> Vec<StateDelta> {
        self.take(observer)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Delta { delta, .. } => Some(delta),
                _ => None,
            })
            .collect()
    }
}

impl ReplicationChannel for MemoryChannel {
    fn broadcast(&mut self, msg: &ServerMessage) {
        for inbox in self.inboxes.values_mut() {
            inbox.push(msg.clone());
        }
    }

    fn send_to(&mut self, observer: ConnectionId, msg: &ServerMessage) {
        if let Some(inbox) = self.inboxes.get_mut(&observer) {
            inbox.push(msg.clone());
        }
    }

    fn detach(&mut self, observer: ConnectionId) {
        self.inboxes.remove(&observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_protocol::PlayerId;

    #[test]
    fn deltas_are_sequenced_from_one() {
        let mut channel = MemoryChannel::new();
        channel.attach(ConnectionId(1));
        let mut replicator = Replicator::new(channel);

        assert_eq!(
            replicator.broadcast_delta(StateDelta::CountdownCancelled),
            DeltaSeq(1)
        );
        assert_eq!(
            replicator.broadcast_delta(StateDelta::PlayerRemoved {
                player_id: PlayerId(0)
            }),
            DeltaSeq(2)
        );

        let msgs = replicator.channel_mut().take(ConnectionId(1));
        let seqs: Vec<DeltaSeq> = msgs
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Delta { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![DeltaSeq(1), DeltaSeq(2)]);
    }

    #[test]
    fn broadcast_reaches_only_attached_observers() {
        let mut channel = MemoryChannel::new();
        channel.attach(ConnectionId(1));
        channel.attach(ConnectionId(2));
        let mut replicator = Replicator::new(channel);

        replicator.detach(ConnectionId(2));
        replicator.broadcast_delta(StateDelta::CountdownCancelled);

        assert_eq!(replicator.channel_mut().take(ConnectionId(1)).len(), 1);
        assert!(replicator.channel_mut().take(ConnectionId(2)).is_empty());
        assert!(!replicator.channel().is_attached(ConnectionId(2)));
    }

    #[test]
    fn targeted_notice_goes_to_one_observer() {
        let mut channel = MemoryChannel::new();
        channel.attach(ConnectionId(1));
        channel.attach(ConnectionId(2));
        let mut replicator = Replicator::new(channel);

        replicator.notify(
            ConnectionId(2),
            &ServerMessage::Rejected {
                reason: skirmish_protocol::RejectReason::InvalidRequest,
                detail: "bad".into(),
            },
        );
        assert!(replicator.channel_mut().take(ConnectionId(1)).is_empty());
        assert_eq!(replicator.channel_mut().take(ConnectionId(2)).len(), 1);
        assert_eq!(replicator.seq(), DeltaSeq(0), "notices do not advance seq");
    }
}
