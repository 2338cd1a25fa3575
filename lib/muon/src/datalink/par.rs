//! Positive Acknowledgement with Retransmission: the first protocol that
//! survives a lossy channel. One-bit sequence numbers tell a retransmission
//! from the next frame; the receiver acknowledges whatever arrived last and
//! only delivers what it expected.

use crate::datalink::{Action, Event, Frame};

pub struct ParSender<P> {
    next_frame_to_send: u8,
    pending: Option<P>,
}

impl<P: Clone> ParSender<P> {
    pub fn new() -> ParSender<P> {
        ParSender {
            next_frame_to_send: 0,
            pending: None,
        }
    }

    pub fn handle(&mut self, event: Event<P>) -> Vec<Action<P>> {
        match event {
            Event::NetworkReady(info) if self.pending.is_none() => {
                self.pending = Some(info);
                self.transmit()
            }
            Event::FrameArrival(frame) if frame.ack == self.next_frame_to_send => {
                self.pending = None;
                self.next_frame_to_send = 1 - self.next_frame_to_send;
                vec![Action::StopTimer(frame.ack), Action::EnableNetwork]
            }
            // A timeout, a damaged frame, or an acknowledgement for the
            // wrong sequence number all end in the same place: send the
            // pending frame again.
            Event::Timeout | Event::CksumErr => self.transmit(),
            Event::FrameArrival(_) => self.transmit(),
            _ => Vec::new(),
        }
    }

    fn transmit(&mut self) -> Vec<Action<P>> {
        match &self.pending {
            Some(info) => vec![
                Action::ToPhysical(Frame::data(self.next_frame_to_send, 0, info.clone())),
                Action::StartTimer(self.next_frame_to_send),
            ],
            None => Vec::new(),
        }
    }
}

pub struct ParReceiver {
    frame_expected: u8,
}

impl ParReceiver {
    pub fn new() -> ParReceiver {
        ParReceiver { frame_expected: 0 }
    }

    pub fn handle<P>(&mut self, event: Event<P>) -> Vec<Action<P>> {
        let frame = match event {
            Event::FrameArrival(frame) => frame,
            _ => return Vec::new(),
        };

        let mut actions = Vec::new();

        if frame.seq == self.frame_expected {
            if let Some(info) = frame.info {
                actions.push(Action::ToNetwork(info));
            }
            self.frame_expected = 1 - self.frame_expected;
        }

        // Acknowledge the sequence number that arrived, duplicate or not.
        actions.push(Action::ToPhysical(Frame::ack(frame.seq)));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_frame<P: Clone + std::fmt::Debug>(actions: &[Action<P>]) -> Frame<P> {
        match actions.first() {
            Some(Action::ToPhysical(frame)) => frame.clone(),
            other => panic!("expected a transmission, got {:?}", other),
        }
    }

    #[test]
    fn test_alternating_bit_delivery() {
        let mut sender = ParSender::new();
        let mut receiver = ParReceiver::new();

        for (i, item) in ["a", "b", "c"].iter().enumerate() {
            let frame = sent_frame(&sender.handle(Event::NetworkReady(*item)));
            assert_eq!(frame.seq, (i % 2) as u8);

            let delivered = receiver.handle(Event::FrameArrival(frame));
            assert_eq!(delivered[0], Action::ToNetwork(*item));
            let ack = sent_frame(&delivered[1..]);

            let accepted = sender.handle(Event::FrameArrival(ack));
            assert_eq!(accepted, vec![Action::StopTimer((i % 2) as u8), Action::EnableNetwork]);
        }
    }

    #[test]
    fn test_timeout_retransmits_same_seq() {
        let mut sender = ParSender::new();

        let first = sent_frame(&sender.handle(Event::NetworkReady("x")));
        let again = sent_frame(&sender.handle(Event::Timeout));

        assert_eq!(first, again);
    }

    #[test]
    fn test_duplicate_is_acked_but_not_redelivered() {
        let mut sender = ParSender::new();
        let mut receiver = ParReceiver::new();

        let frame = sent_frame(&sender.handle(Event::NetworkReady("x")));

        // The frame arrives twice; only the first copy reaches the network
        // layer, both copies are acknowledged.
        let first = receiver.handle(Event::FrameArrival(frame.clone()));
        assert_eq!(first[0], Action::ToNetwork("x"));
        assert_eq!(first.len(), 2);

        let second = receiver.handle(Event::FrameArrival(frame));
        assert_eq!(second.len(), 1);
        match &second[0] {
            Action::ToPhysical(ack) => assert_eq!(ack.ack, 0),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_stale_ack_triggers_retransmit() {
        let mut sender = ParSender::new();

        let frame = sent_frame(&sender.handle(Event::NetworkReady("x")));
        assert_eq!(frame.seq, 0);

        // An acknowledgement for the wrong sequence number resends.
        let resent = sender.handle(Event::FrameArrival(Frame::<&str>::ack(1)));
        assert_eq!(sent_frame(&resent).seq, 0);
    }
}
