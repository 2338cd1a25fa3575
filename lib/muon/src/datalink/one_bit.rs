//! The one-bit sliding window: two of these entities face each other, each
//! sending data in its own direction and piggybacking acknowledgements for
//! the other's. A window of one frame per direction.

use crate::datalink::{Action, Event, Frame};

pub struct OneBitEntity<P> {
    next_frame_to_send: u8,
    frame_expected: u8,
    buffer: Option<P>,
}

impl<P: Clone> OneBitEntity<P> {
    pub fn new() -> OneBitEntity<P> {
        OneBitEntity {
            next_frame_to_send: 0,
            frame_expected: 0,
            buffer: None,
        }
    }

    pub fn handle(&mut self, event: Event<P>) -> Vec<Action<P>> {
        match event {
            Event::NetworkReady(info) if self.buffer.is_none() => {
                self.buffer = Some(info);
                self.transmit()
            }
            Event::FrameArrival(frame) => {
                let mut actions = Vec::new();

                if frame.seq == self.frame_expected {
                    if let Some(info) = frame.info {
                        actions.push(Action::ToNetwork(info));
                    }
                    self.frame_expected = 1 - self.frame_expected;
                }

                if frame.ack == self.next_frame_to_send {
                    actions.push(Action::StopTimer(self.next_frame_to_send));
                    actions.push(Action::EnableNetwork);
                    self.buffer = None;
                    self.next_frame_to_send = 1 - self.next_frame_to_send;
                }

                // Whatever happened, the outstanding frame (if any) goes
                // out again carrying the fresh acknowledgement.
                actions.extend(self.transmit());
                actions
            }
            Event::Timeout | Event::CksumErr => self.transmit(),
            _ => Vec::new(),
        }
    }

    fn transmit(&mut self) -> Vec<Action<P>> {
        match &self.buffer {
            Some(info) => vec![
                Action::ToPhysical(Frame::data(
                    self.next_frame_to_send,
                    1 - self.frame_expected,
                    info.clone(),
                )),
                Action::StartTimer(self.next_frame_to_send),
            ],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_frame<P: Clone + std::fmt::Debug>(actions: &[Action<P>]) -> Option<Frame<P>> {
        actions.iter().find_map(|action| match action {
            Action::ToPhysical(frame) => Some(frame.clone()),
            _ => None,
        })
    }

    fn delivered<P: Clone + std::fmt::Debug>(actions: &[Action<P>]) -> Option<P> {
        actions.iter().find_map(|action| match action {
            Action::ToNetwork(info) => Some(info.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_bidirectional_piggyback_exchange() {
        let mut left: OneBitEntity<&str> = OneBitEntity::new();
        let mut right: OneBitEntity<&str> = OneBitEntity::new();

        // Both sides load their first packet; left's frame goes first.
        let l0 = sent_frame(&left.handle(Event::NetworkReady("L0"))).unwrap();
        assert_eq!((l0.seq, l0.ack), (0, 1));
        let _r0 = sent_frame(&right.handle(Event::NetworkReady("R0"))).unwrap();

        // Right takes left's frame: delivers it and repeats its own frame,
        // now acknowledging seq 0.
        let actions = right.handle(Event::FrameArrival(l0));
        assert_eq!(delivered(&actions), Some("L0"));
        let r0 = sent_frame(&actions).unwrap();
        assert_eq!((r0.seq, r0.ack), (0, 0));

        // Left takes that frame: delivers R0 and sees its own seq 0
        // acknowledged, freeing the window.
        let actions = left.handle(Event::FrameArrival(r0));
        assert_eq!(delivered(&actions), Some("R0"));
        assert!(actions.contains(&Action::StopTimer(0)));
        assert!(actions.contains(&Action::EnableNetwork));

        // The next frame in each direction flips the sequence bit.
        let l1 = sent_frame(&left.handle(Event::NetworkReady("L1"))).unwrap();
        assert_eq!(l1.seq, 1);
    }

    #[test]
    fn test_timeout_repeats_outstanding_frame() {
        let mut entity: OneBitEntity<&str> = OneBitEntity::new();

        let first = sent_frame(&entity.handle(Event::NetworkReady("X"))).unwrap();
        let again = sent_frame(&entity.handle(Event::Timeout)).unwrap();

        assert_eq!(first, again);
    }

    #[test]
    fn test_duplicate_frame_not_redelivered() {
        let mut left: OneBitEntity<&str> = OneBitEntity::new();
        let mut right: OneBitEntity<&str> = OneBitEntity::new();

        let frame = sent_frame(&left.handle(Event::NetworkReady("X"))).unwrap();

        let first = right.handle(Event::FrameArrival(frame.clone()));
        assert_eq!(delivered(&first), Some("X"));

        let second = right.handle(Event::FrameArrival(frame));
        assert_eq!(delivered(&second), None);
    }
}
