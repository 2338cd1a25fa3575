use crate::frame::{read_frame, write_frame};
use crate::pkt::MAX_RECORD_LEN;
use crate::seg::{self, LossProfile, Segment};
use crate::NodeId;
use argon::logging::{self, Logger};
use argon::shared::{FatalKind, NetError, NetResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufReader, Cursor, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};

/// Writes a `{node, segment bytes}` record. The node field is the
/// destination on the SRT→SNP direction and the source on the way back.
pub fn write_seg_record<W: Write>(stream: &mut W, node: NodeId, seg_wire: &[u8]) -> NetResult<()> {
    let mut body = Vec::with_capacity(4 + seg_wire.len());
    body.write_u32::<BigEndian>(node).unwrap();
    body.extend_from_slice(seg_wire);

    write_frame(stream, &body)
}

/// Reads the next `{node, segment bytes}` record without interpreting the
/// segment.
pub fn read_seg_record<R: Read>(stream: &mut R) -> NetResult<(NodeId, Vec<u8>)> {
    let mut body = read_frame(stream, MAX_RECORD_LEN)?;

    if body.len() < 4 {
        return Err(NetError::Fatal(FatalKind::TruncatedRecord));
    }

    let node = Cursor::new(&body[..4]).read_u32::<BigEndian>()?;
    body.drain(..4);

    Ok((node, body))
}

/// Sending half of a segment link, shared by every thread of an endpoint.
#[derive(Clone)]
pub struct SegmentTx {
    stream: Arc<Mutex<TcpStream>>,
    log: Logger,
}

impl SegmentTx {
    /// Frames and sends one segment addressed to `node`.
    pub fn send(&self, node: NodeId, segment: &Segment) -> NetResult<()> {
        let wire = segment.to_wire();
        let mut stream = self.stream.lock().expect("segment link lock poisoned");

        logging::trace!(self.log, "segment out";
                        "context" => "send",
                        "node" => node,
                        "kind" => ?segment.kind,
                        "seq" => segment.seq_num,
                        "ack" => segment.ack_num,
                        "len" => segment.data.len());

        write_seg_record(&mut *stream, node, &wire)
    }

    /// Shuts the underlying stream down in both directions, unblocking the
    /// receiving half.
    pub fn shutdown(&self) {
        let stream = self.stream.lock().expect("segment link lock poisoned");
        drop(stream.shutdown(Shutdown::Both));
    }
}

/// Receiving half of a segment link; owned by the endpoint's dispatcher
/// thread. The receive path is parse, then loss injection, then checksum
/// verification, then delivery.
pub struct SegmentRx {
    reader: BufReader<TcpStream>,
    loss: LossProfile,
    log: Logger,
}

impl SegmentRx {
    /// Blocks until a sound segment arrives. Injected losses and checksum
    /// failures are dropped here and never surface; only link errors do.
    pub fn recv(&mut self) -> NetResult<(NodeId, Segment)> {
        loop {
            let (node, mut wire) = match read_seg_record(&mut self.reader) {
                Ok(record) => record,
                Err(NetError::Fatal(FatalKind::Io(kind))) => {
                    return Err(NetError::Fatal(FatalKind::Io(kind)));
                }
                Err(error) => {
                    logging::warn!(self.log, "unreadable segment record dropped";
                                   "context" => "recv",
                                   "error" => ?error);
                    continue;
                }
            };

            if self.loss.mangle(&mut wire) {
                logging::debug!(self.log, "segment lost (injected)"; "context" => "recv");
                continue;
            }

            if !seg::verify(&wire) {
                logging::debug!(self.log, "segment dropped on checksum"; "context" => "recv");
                continue;
            }

            match Segment::from_wire(&wire) {
                Ok(segment) => {
                    logging::trace!(self.log, "segment in";
                                    "context" => "recv",
                                    "node" => node,
                                    "kind" => ?segment.kind,
                                    "seq" => segment.seq_num,
                                    "ack" => segment.ack_num,
                                    "len" => segment.data.len());

                    return Ok((node, segment));
                }
                Err(error) => {
                    logging::warn!(self.log, "malformed segment dropped";
                                   "context" => "recv",
                                   "error" => ?error);
                }
            }
        }
    }
}

/// Splits one TCP stream into the two halves of a segment link.
pub fn segment_link<'a, L: Into<Option<&'a Logger>>>(
    stream: TcpStream,
    loss: LossProfile,
    log: L,
) -> std::io::Result<(SegmentTx, SegmentRx)> {
    let log = logging::child(log);
    let read_half = stream.try_clone()?;

    Ok((
        SegmentTx {
            stream: Arc::new(Mutex::new(stream)),
            log: log.clone(),
        },
        SegmentRx {
            reader: BufReader::new(read_half),
            loss,
            log,
        },
    ))
}
