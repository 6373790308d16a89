/// `Port` models a named, bounded message endpoint of a component.
///
/// Every port owns an inbound queue registered with a shared [`Connection`]. Sending looks the
/// destination up in the connection and enqueues directly into its inbound queue, failing without
/// side effects when that queue is at capacity.
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::base::msg::Msg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl PortId {
    /// Placeholder for messages that have not been routed yet.
    pub const UNCONNECTED: PortId = PortId(u32::MAX);
}

impl Default for PortId {
    fn default() -> Self {
        Self::UNCONNECTED
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNCONNECTED {
            write!(f, "port#unconnected")
        } else {
            write!(f, "port#{}", self.0)
        }
    }
}

#[derive(Debug)]
struct Inbox {
    name: String,
    capacity: usize,
    queue: VecDeque<Msg>,
}

impl Inbox {
    fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }
}

/// Wrapper type of a reference to an inbound queue.
#[derive(Debug, Clone)]
struct InboxRef(Arc<RwLock<Inbox>>);

impl InboxRef {
    fn read<R>(&self, f: impl FnOnce(&Inbox) -> R) -> R {
        f(&self.0.read().expect("rw lock poisoned"))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Inbox) -> R) -> R {
        f(&mut self.0.write().expect("rw lock poisoned"))
    }
}

/// Registry of every inbound queue reachable by message destination.
#[derive(Debug, Clone, Default)]
pub struct Connection {
    inboxes: Arc<RwLock<Vec<InboxRef>>>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    fn plug_in(&self, name: String, capacity: usize) -> (PortId, InboxRef) {
        assert!(capacity > 0, "port {name} needs a non-zero buffer");
        let inbox = InboxRef(Arc::new(RwLock::new(Inbox {
            name,
            capacity,
            queue: VecDeque::with_capacity(capacity),
        })));
        let mut inboxes = self.inboxes.write().expect("rw lock poisoned");
        let id = PortId(inboxes.len() as u32);
        inboxes.push(inbox.clone());
        (id, inbox)
    }

    fn inbox(&self, id: PortId) -> Option<InboxRef> {
        let inboxes = self.inboxes.read().expect("rw lock poisoned");
        inboxes.get(id.0 as usize).cloned()
    }

    pub fn name_of(&self, id: PortId) -> String {
        self.inbox(id)
            .map(|inbox| inbox.read(|i| i.name.clone()))
            .unwrap_or_else(|| id.to_string())
    }

    pub fn num_ports(&self) -> usize {
        self.inboxes.read().expect("rw lock poisoned").len()
    }
}

/// A send that the destination could not accept. The message is handed back untouched.
#[derive(Debug)]
pub struct SendError {
    pub msg: Msg,
    pub dst_name: String,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} rejected: {} is full",
            self.msg.kind_name(),
            self.msg.id(),
            self.dst_name
        )
    }
}

impl std::error::Error for SendError {}

#[derive(Debug)]
pub struct Port {
    id: PortId,
    name: String,
    inbox: InboxRef,
    conn: Connection,
}

impl Port {
    pub fn new(conn: &Connection, name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        let (id, inbox) = conn.plug_in(name.clone(), capacity);
        Self {
            id,
            name,
            inbox,
            conn: conn.clone(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Head of the inbound queue, left in place.
    pub fn peek(&self) -> Option<Msg> {
        self.inbox.read(|i| i.queue.front().cloned())
    }

    /// Removes and returns the head of the inbound queue.
    pub fn retrieve(&mut self) -> Option<Msg> {
        self.inbox.write(|i| i.queue.pop_front())
    }

    /// Delivers `msg` into the inbound queue of `msg.meta().dst`.
    pub fn send(&mut self, msg: Msg) -> Result<(), SendError> {
        let dst = msg.meta().dst;
        let Some(dst_inbox) = self.conn.inbox(dst) else {
            panic!(
                "{}: {} {} addressed to unknown {}",
                self.name,
                msg.kind_name(),
                msg.id(),
                dst
            );
        };
        dst_inbox.write(|inbox| {
            if inbox.is_full() {
                return Err(SendError {
                    msg,
                    dst_name: inbox.name.clone(),
                });
            }
            inbox.queue.push_back(msg);
            Ok(())
        })
    }

    pub fn can_send(&self, dst: PortId) -> bool {
        self.conn
            .inbox(dst)
            .is_some_and(|inbox| inbox.read(|i| !i.is_full()))
    }

    /// Puts a message straight into this port's own inbound queue, as if a peer had sent it.
    pub fn deliver(&mut self, msg: Msg) -> Result<(), SendError> {
        self.inbox.write(|inbox| {
            if inbox.is_full() {
                return Err(SendError {
                    msg,
                    dst_name: inbox.name.clone(),
                });
            }
            inbox.queue.push_back(msg);
            Ok(())
        })
    }

    /// Drops everything waiting in the inbound queue and returns how many messages were dropped.
    pub fn drain(&mut self) -> usize {
        self.inbox.write(|i| {
            let n = i.queue.len();
            i.queue.clear();
            n
        })
    }

    pub fn len(&self) -> usize {
        self.inbox.read(|i| i.queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::msg::{IdGenerator, ReadReq};

    fn read_to(ids: &IdGenerator, src: &Port, dst: &Port) -> Msg {
        Msg::from(ReadReq::new(ids.generate(), 0x40, 4, 1)).routed(src.id(), dst.id(), 0)
    }

    #[test]
    fn send_peek_retrieve() {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let mut a = Port::new(&conn, "A", 2);
        let mut b = Port::new(&conn, "B", 2);
        assert!(b.peek().is_none());

        let msg = read_to(&ids, &a, &b);
        let id = msg.id();
        a.send(msg).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b.peek().map(|m| m.id()), Some(id));
        assert_eq!(b.len(), 1);
        assert_eq!(b.retrieve().map(|m| m.id()), Some(id));
        assert!(b.is_empty());
    }

    #[test]
    fn full_destination_rejects_without_side_effects() {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let mut a = Port::new(&conn, "A", 1);
        let b = Port::new(&conn, "B", 1);

        a.send(read_to(&ids, &a, &b)).unwrap();
        assert!(!a.can_send(b.id()));
        let rejected = read_to(&ids, &a, &b);
        let rejected_id = rejected.id();
        let err = a.send(rejected).unwrap_err();
        assert_eq!(err.msg.id(), rejected_id);
        assert_eq!(err.dst_name, "B");
        assert_eq!(b.len(), 1);
    }

    #[test]
    #[should_panic(expected = "addressed to unknown")]
    fn unknown_destination_is_fatal() {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let mut a = Port::new(&conn, "A", 1);
        let msg = Msg::from(ReadReq::new(ids.generate(), 0, 4, 1)).routed(a.id(), PortId(42), 0);
        let _ = a.send(msg);
    }

    #[test]
    fn drain_empties_inbox() {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let mut a = Port::new(&conn, "A", 4);
        let mut b = Port::new(&conn, "B", 4);
        for _ in 0..3 {
            a.send(read_to(&ids, &a, &b)).unwrap();
        }
        assert_eq!(b.drain(), 3);
        assert!(b.retrieve().is_none());
        assert_eq!(conn.name_of(b.id()), "B");
    }
}
