//! Go-Back-N over a full-duplex channel with piggybacked cumulative
//! acknowledgements: up to `MAX_SEQ` frames outstanding, and a timeout
//! rewinds transmission to the oldest unacknowledged frame.

use crate::datalink::{between, inc, Action, Event, Frame, SeqNr, MAX_SEQ};

pub struct GoBackN<P> {
    next_frame_to_send: SeqNr,
    ack_expected: SeqNr,
    frame_expected: SeqNr,
    buffer: Vec<Option<P>>,
    nbuffered: usize,
}

impl<P: Clone> GoBackN<P> {
    pub fn new() -> GoBackN<P> {
        GoBackN {
            next_frame_to_send: 0,
            ack_expected: 0,
            frame_expected: 0,
            buffer: (0..=MAX_SEQ).map(|_| None).collect(),
            nbuffered: 0,
        }
    }

    /// In-flight frame count, bounded by `MAX_SEQ`.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.nbuffered
    }

    pub fn handle(&mut self, event: Event<P>) -> Vec<Action<P>> {
        let mut actions = match event {
            Event::NetworkReady(info) => {
                let seq = self.next_frame_to_send;
                self.buffer[seq as usize] = Some(info);
                self.nbuffered += 1;

                let actions = self.send_data(seq);
                self.next_frame_to_send = inc(self.next_frame_to_send);
                actions
            }
            Event::FrameArrival(frame) => {
                let mut actions = Vec::new();

                if frame.seq == self.frame_expected {
                    if let Some(info) = frame.info {
                        actions.push(Action::ToNetwork(info));
                    }
                    self.frame_expected = inc(self.frame_expected);
                }

                // Cumulative acknowledgement: everything up to `frame.ack`
                // leaves the window.
                while between(self.ack_expected, frame.ack, self.next_frame_to_send) {
                    self.nbuffered -= 1;
                    self.buffer[self.ack_expected as usize] = None;
                    actions.push(Action::StopTimer(self.ack_expected));
                    self.ack_expected = inc(self.ack_expected);
                }

                actions
            }
            Event::CksumErr => Vec::new(),
            Event::Timeout => {
                // Go back N: rewind to the window base and resend every
                // outstanding frame.
                let mut actions = Vec::new();
                self.next_frame_to_send = self.ack_expected;

                for _ in 0..self.nbuffered {
                    actions.extend(self.send_data(self.next_frame_to_send));
                    self.next_frame_to_send = inc(self.next_frame_to_send);
                }

                actions
            }
        };

        actions.push(if self.nbuffered < MAX_SEQ as usize {
            Action::EnableNetwork
        } else {
            Action::DisableNetwork
        });

        actions
    }

    fn send_data(&self, seq: SeqNr) -> Vec<Action<P>> {
        let info = self.buffer[seq as usize]
            .clone()
            .expect("transmitting an empty window slot");
        let ack = (self.frame_expected + MAX_SEQ) % (MAX_SEQ + 1);

        vec![
            Action::ToPhysical(Frame::data(seq, ack, info)),
            Action::StartTimer(seq),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_frames<P: Clone + std::fmt::Debug>(actions: &[Action<P>]) -> Vec<Frame<P>> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::ToPhysical(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_window_fills_then_disables_network() {
        let mut gbn: GoBackN<usize> = GoBackN::new();

        for i in 0..MAX_SEQ as usize {
            let actions = gbn.handle(Event::NetworkReady(i));
            let frames = sent_frames(&actions);
            assert_eq!(frames[0].seq, i as u8);

            let expected_gate = if i + 1 < MAX_SEQ as usize {
                Action::EnableNetwork
            } else {
                Action::DisableNetwork
            };
            assert_eq!(actions.last(), Some(&expected_gate));
        }

        assert_eq!(gbn.outstanding(), MAX_SEQ as usize);
    }

    #[test]
    fn test_timeout_resends_all_outstanding() {
        let mut gbn: GoBackN<usize> = GoBackN::new();

        for i in 0..4 {
            gbn.handle(Event::NetworkReady(i));
        }

        let frames = sent_frames(&gbn.handle(Event::Timeout));
        let seqs: Vec<SeqNr> = frames.iter().map(|frame| frame.seq).collect();

        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(gbn.outstanding(), 4);
    }

    #[test]
    fn test_cumulative_ack_pops_multiple() {
        let mut gbn: GoBackN<usize> = GoBackN::new();

        for i in 0..5 {
            gbn.handle(Event::NetworkReady(i));
        }

        // A data frame from the peer piggybacks an acknowledgement for
        // frames 0..=2.
        let actions = gbn.handle(Event::FrameArrival(Frame::data(0, 2, 99usize)));

        assert_eq!(actions[0], Action::ToNetwork(99));
        assert!(actions.contains(&Action::StopTimer(0)));
        assert!(actions.contains(&Action::StopTimer(1)));
        assert!(actions.contains(&Action::StopTimer(2)));
        assert_eq!(gbn.outstanding(), 2);
    }

    #[test]
    fn test_in_order_delivery_only() {
        let mut gbn: GoBackN<&str> = GoBackN::new();

        // Frame 1 ahead of frame 0 is refused; frame 0 is accepted.
        let skipped = gbn.handle(Event::FrameArrival(Frame::data(1, MAX_SEQ, "late")));
        assert!(!skipped.contains(&Action::ToNetwork("late")));

        let accepted = gbn.handle(Event::FrameArrival(Frame::data(0, MAX_SEQ, "first")));
        assert!(accepted.contains(&Action::ToNetwork("first")));
    }

    #[test]
    fn test_checksum_error_is_ignored() {
        let mut gbn: GoBackN<usize> = GoBackN::new();
        gbn.handle(Event::NetworkReady(1));

        let actions = gbn.handle(Event::CksumErr);
        assert_eq!(actions, vec![Action::EnableNetwork]);
        assert_eq!(gbn.outstanding(), 1);
    }
}
