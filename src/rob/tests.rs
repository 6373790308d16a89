use super::*;
use crate::base::msg::{ControlKind, ControlMsg, DataReadyRsp, ReadReq, WriteDoneRsp, WriteReq};

struct Harness {
    rob: ReorderBuffer,
    agent: Port,
    below: Port,
    ctrl: Port,
    ids: IdGenerator,
}

fn harness(buffer_size: usize, port_buffer_size: usize) -> Harness {
    let conn = Connection::new();
    let ids = IdGenerator::new();
    let below = Port::new(&conn, "Below", port_buffer_size);
    let rob = RobBuilder::new("ROB", ids.clone())
        .with_buffer_size(buffer_size)
        .with_num_req_per_cycle(4)
        .with_port_buffer_size(port_buffer_size)
        .with_bottom_unit(below.id())
        .build(&conn);
    Harness {
        rob,
        agent: Port::new(&conn, "Agent", 8),
        below,
        ctrl: Port::new(&conn, "Ctrl", 8),
        ids,
    }
}

impl Harness {
    fn send_read(&mut self, address: u64) -> MsgId {
        let read = ReadReq::new(self.ids.generate(), address, 4, 1);
        let id = read.meta.id;
        let msg = Msg::from(read).routed(self.agent.id(), self.rob.top_port.id(), 0);
        self.agent.send(msg).expect("rob top port full");
        id
    }

    fn send_write(&mut self, address: u64) -> MsgId {
        let write = WriteReq::new(self.ids.generate(), address, vec![1, 2, 3, 4], 1);
        let id = write.meta.id;
        let msg = Msg::from(write).routed(self.agent.id(), self.rob.top_port.id(), 0);
        self.agent.send(msg).expect("rob top port full");
        id
    }

    fn send_control(&mut self, kind: ControlKind) -> MsgId {
        let ctrl = ControlMsg::new(self.ids.generate(), kind);
        let id = ctrl.meta.id;
        let msg = Msg::from(ctrl).routed(self.ctrl.id(), self.rob.control_port.id(), 0);
        self.ctrl.send(msg).expect("rob control port full");
        id
    }

    fn reply(&mut self, req: &Msg, payload: u8) {
        let rsp: Msg = match req {
            Msg::Read(_) => DataReadyRsp::new(self.ids.generate(), req.id(), vec![payload; 4]).into(),
            Msg::Write(_) => WriteDoneRsp::new(self.ids.generate(), req.id()).into(),
            other => panic!("unexpected {}", other.kind_name()),
        };
        let rsp = rsp.routed(self.below.id(), self.rob.bottom_port.id(), 0);
        self.below.send(rsp).expect("rob bottom port full");
    }

    fn drain_below(&mut self) -> Vec<Msg> {
        std::iter::from_fn(|| self.below.retrieve()).collect()
    }

    fn drain_agent(&mut self) -> Vec<Msg> {
        std::iter::from_fn(|| self.agent.retrieve()).collect()
    }
}

#[test]
fn forwards_a_private_clone_to_the_bottom_unit() {
    let mut h = harness(4, 4);
    let top_id = h.send_read(0x100);
    assert!(h.rob.tick(0));

    let forwarded = h.drain_below();
    assert_eq!(forwarded.len(), 1);
    let Msg::Read(read) = &forwarded[0] else {
        panic!("expected a read");
    };
    assert_ne!(read.meta.id, top_id);
    assert_eq!(read.meta.dst, h.below.id());
    assert_eq!(read.meta.src, h.rob.bottom_port.id());
    assert_eq!(read.address, 0x100);
    assert_eq!(read.byte_size, 4);
    assert_eq!(h.rob.num_transactions(), 1);
    assert!(h.rob.top_port.is_empty());
}

#[test]
fn responses_return_in_request_order() {
    let mut h = harness(8, 8);
    let top_ids = [h.send_read(0x100), h.send_write(0x200), h.send_read(0x300)];
    h.rob.tick(0);
    let below = h.drain_below();
    assert_eq!(below.len(), 3);

    // complete back to front
    h.reply(&below[2], 3);
    h.rob.tick(1);
    h.reply(&below[1], 2);
    h.rob.tick(2);
    assert!(h.drain_agent().is_empty());

    h.reply(&below[0], 1);
    h.rob.tick(3);
    h.rob.tick(4);

    let up = h.drain_agent();
    let respond_to: Vec<_> = up.iter().filter_map(Msg::respond_to).collect();
    assert_eq!(respond_to, top_ids.to_vec());
    assert!(up.iter().all(|m| m.meta().dst == h.agent.id()));
    match &up[0] {
        Msg::DataReady(dr) => assert_eq!(dr.data, vec![1; 4]),
        other => panic!("unexpected {}", other.kind_name()),
    }
    assert!(matches!(up[1], Msg::WriteDone(_)));
    match &up[2] {
        Msg::DataReady(dr) => assert_eq!(dr.data, vec![3; 4]),
        other => panic!("unexpected {}", other.kind_name()),
    }
    assert_eq!(h.rob.num_transactions(), 0);
    assert_eq!(h.rob.stats().completed(), 3);
}

#[test]
fn later_completions_wait_for_the_front() {
    let mut h = harness(8, 8);
    h.send_read(0x0);
    h.send_read(0x40);
    h.rob.tick(0);
    let below = h.drain_below();

    h.reply(&below[1], 9);
    for now in 1..10 {
        h.rob.tick(now);
    }
    assert!(h.drain_agent().is_empty());
    assert_eq!(h.rob.num_transactions(), 2);
}

#[test]
fn stalls_when_buffer_is_full() {
    let mut h = harness(1, 4);
    h.send_read(0x0);
    h.send_read(0x40);
    h.rob.tick(0);
    assert_eq!(h.drain_below().len(), 1);
    assert_eq!(h.rob.top_port.len(), 1);
    assert!(h.rob.stats().full_stalls() > 0);
}

#[test]
fn bottom_backpressure_leaves_request_in_top_port() {
    let mut h = harness(8, 1);
    h.send_read(0x0);
    h.rob.tick(0);
    assert_eq!(h.below.len(), 1);

    h.send_read(0x40);
    assert!(!h.rob.tick(1));
    assert_eq!(h.rob.top_port.len(), 1);
    assert_eq!(h.rob.num_transactions(), 1);

    h.drain_below();
    assert!(h.rob.tick(2));
    assert!(h.rob.top_port.is_empty());
    assert_eq!(h.rob.num_transactions(), 2);
}

#[test]
fn unmatched_responses_are_dropped() {
    let mut h = harness(4, 4);
    let stray = Msg::from(ReadReq::new(h.ids.generate(), 0, 4, 1));
    h.reply(&stray, 0);
    assert!(h.rob.tick(0));
    assert!(h.rob.bottom_port.is_empty());
    assert!(h.drain_agent().is_empty());
    assert_eq!(h.rob.stats().unmatched_responses(), 1);
}

#[test]
fn discard_clears_and_suspends_pipeline() {
    let mut h = harness(4, 4);
    h.send_read(0x0);
    h.rob.tick(0);
    let below = h.drain_below();

    let discard_id = h.send_control(ControlKind::DiscardTransactions);
    h.send_read(0x40);
    assert!(h.rob.tick(1));
    assert!(h.rob.is_flushing());
    assert_eq!(h.rob.num_transactions(), 0);

    let ack = h.ctrl.retrieve().expect("discard must be acknowledged");
    assert_eq!(ack.respond_to(), Some(discard_id));

    // nothing moves while flushing; the late response stays put
    h.reply(&below[0], 1);
    for now in 2..6 {
        assert!(!h.rob.tick(now));
    }
    assert_eq!(h.rob.top_port.len(), 1);
    assert_eq!(h.rob.bottom_port.len(), 1);
    assert!(h.drain_below().is_empty());
}

#[test]
fn restart_drains_stale_messages() {
    let mut h = harness(4, 4);
    h.send_read(0x0);
    h.rob.tick(0);
    let below = h.drain_below();
    h.send_control(ControlKind::DiscardTransactions);
    h.rob.tick(1);
    h.ctrl.retrieve();

    h.reply(&below[0], 1);
    h.send_read(0x40);
    let restart_id = h.send_control(ControlKind::Restart);
    assert!(h.rob.tick(2));

    assert!(!h.rob.is_flushing());
    assert!(h.rob.top_port.is_empty());
    assert!(h.rob.bottom_port.is_empty());
    assert_eq!(h.ctrl.retrieve().and_then(|m| m.respond_to()), Some(restart_id));

    // back to normal operation
    h.send_read(0x80);
    h.rob.tick(3);
    assert_eq!(h.drain_below().len(), 1);
    assert!(h.drain_agent().is_empty());
}

#[test]
fn repeated_control_messages_are_harmless() {
    let mut h = harness(4, 4);
    h.send_control(ControlKind::Restart);
    h.rob.tick(0);
    assert!(!h.rob.is_flushing());

    h.send_control(ControlKind::DiscardTransactions);
    h.send_control(ControlKind::DiscardTransactions);
    h.rob.tick(1);
    h.rob.tick(2);
    assert!(h.rob.is_flushing());
    assert_eq!(h.drain_ctrl_acks(), 3);
    assert_eq!(h.rob.stats().discards(), 2);
    assert_eq!(h.rob.stats().restarts(), 1);
}

#[test]
fn control_waits_for_ack_capacity() {
    let conn = Connection::new();
    let ids = IdGenerator::new();
    let below = Port::new(&conn, "Below", 4);
    let mut rob = ReorderBuffer::new("ROB", &conn, ids.clone(), RobConfig::default())
        .with_bottom_unit(below.id());
    let mut ctrl = Port::new(&conn, "Ctrl", 1);

    // occupy the only slot of the controller's inbox
    let filler = ControlMsg::new(ids.generate(), ControlKind::Restart);
    ctrl.deliver(filler.into()).unwrap();

    let discard = ControlMsg::new(ids.generate(), ControlKind::DiscardTransactions);
    ctrl.send(Msg::from(discard).routed(ctrl.id(), rob.control_port.id(), 0))
        .unwrap();
    assert!(!rob.tick(0));
    assert!(!rob.is_flushing());
    assert_eq!(rob.control_port.len(), 1);

    ctrl.retrieve();
    assert!(rob.tick(1));
    assert!(rob.is_flushing());
    assert!(rob.control_port.is_empty());
}

#[test]
#[should_panic(expected = "unsupported control message")]
fn flush_is_not_a_rob_command() {
    let mut h = harness(4, 4);
    h.send_control(ControlKind::Flush);
    h.rob.tick(0);
}

impl Harness {
    fn drain_ctrl_acks(&mut self) -> usize {
        std::iter::from_fn(|| self.ctrl.retrieve())
            .filter(|m| {
                matches!(
                    m,
                    Msg::Control(ControlMsg {
                        kind: ControlKind::NotifyDone { .. },
                        ..
                    })
                )
            })
            .count()
    }
}
