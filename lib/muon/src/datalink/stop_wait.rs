//! Stop-and-Wait for an error-free channel and a finite receiver: the
//! sender emits one frame and stands still until the receiver's empty
//! acknowledgement frees it again. Still no sequence numbers; nothing can
//! be lost, only delayed.

use crate::datalink::{Action, Event, Frame};

pub struct StopWaitSender {
    awaiting_ack: bool,
}

impl StopWaitSender {
    pub fn new() -> StopWaitSender {
        StopWaitSender { awaiting_ack: false }
    }

    pub fn handle<P>(&mut self, event: Event<P>) -> Vec<Action<P>> {
        match event {
            Event::NetworkReady(info) if !self.awaiting_ack => {
                self.awaiting_ack = true;
                vec![Action::ToPhysical(Frame::data(0, 0, info)), Action::DisableNetwork]
            }
            Event::FrameArrival(_) if self.awaiting_ack => {
                self.awaiting_ack = false;
                vec![Action::EnableNetwork]
            }
            _ => Vec::new(),
        }
    }
}

pub struct StopWaitReceiver;

impl StopWaitReceiver {
    pub fn new() -> StopWaitReceiver {
        StopWaitReceiver
    }

    pub fn handle<P>(&mut self, event: Event<P>) -> Vec<Action<P>> {
        match event {
            Event::FrameArrival(frame) => match frame.info {
                Some(info) => vec![Action::ToNetwork(info), Action::ToPhysical(Frame::ack(0))],
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
