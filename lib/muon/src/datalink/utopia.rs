//! Utopia: a lossless channel toward an infinitely fast receiver. The
//! sender pumps frames as fast as the network layer supplies packets; the
//! receiver accepts everything. No sequence numbers, no acknowledgements,
//! no timers.

use crate::datalink::{Action, Event, Frame};

pub struct UtopiaSender;

impl UtopiaSender {
    pub fn new() -> UtopiaSender {
        UtopiaSender
    }

    pub fn handle<P>(&mut self, event: Event<P>) -> Vec<Action<P>> {
        match event {
            Event::NetworkReady(info) => vec![Action::ToPhysical(Frame::data(0, 0, info))],
            _ => Vec::new(),
        }
    }
}

pub struct UtopiaReceiver;

impl UtopiaReceiver {
    pub fn new() -> UtopiaReceiver {
        UtopiaReceiver
    }

    pub fn handle<P>(&mut self, event: Event<P>) -> Vec<Action<P>> {
        match event {
            Event::FrameArrival(frame) => match frame.info {
                Some(info) => vec![Action::ToNetwork(info)],
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_flows_through() {
        let mut sender = UtopiaSender::new();
        let mut receiver = UtopiaReceiver::new();

        for i in 0..5u32 {
            let actions = sender.handle(Event::NetworkReady(i));
            assert_eq!(actions.len(), 1);

            let frame = match &actions[0] {
                Action::ToPhysical(frame) => frame.clone(),
                other => panic!("unexpected action {:?}", other),
            };

            assert_eq!(receiver.handle(Event::FrameArrival(frame)), vec![Action::ToNetwork(i)]);
        }
    }
}
