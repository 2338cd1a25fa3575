//! Stress server demo: receives the length-prefixed bulk buffer from the
//! stress client and verifies it arrived intact and in order.

use argon::logging;
use byteorder::{BigEndian, ReadBytesExt};
use clap::{App, Arg};
use muon::config::OVERLAY_PORT;
use muon::seg::LossProfile;
use muon::transport::{segment_link, SrtServer};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::Duration;

const SVRPORT: u16 = 88;
const WAITTIME: Duration = Duration::from_secs(10);

pub fn main() {
    let matches = App::new("Stress SRT Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Receives a bulk buffer over one SRT connection.")
        .arg(
            Arg::with_name("loss")
                .long("loss")
                .takes_value(true)
                .help("Received-segment loss rate (default 0.1)"),
        )
        .get_matches();

    let loss: f64 = matches.value_of("loss").unwrap_or("0.1").parse().expect("Error parsing loss rate");
    let log = logging::init();

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, OVERLAY_PORT)).expect("Error binding overlay port");
    logging::info!(log, "waiting for client link"; "port" => OVERLAY_PORT);
    let (stream, _) = listener.accept().expect("Error accepting client link");

    let (tx, rx) = segment_link(stream, LossProfile::new(loss), &log).expect("Error splitting link");
    let server = SrtServer::new(tx, rx, &log);

    let sock = server.sock(SVRPORT).expect("Error opening server socket");
    server.accept(sock).expect("Error accepting connection");
    logging::info!(log, "connection accepted");

    let mut length_prefix = [0u8; 4];
    server.recv(sock, &mut length_prefix).expect("Error receiving length");
    let mut prefix = &length_prefix[..];
    let length = prefix.read_u32::<BigEndian>().unwrap() as usize;
    logging::info!(log, "expecting payload"; "bytes" => length);

    // Drain in chunks; a single read larger than the receive buffer could
    // never be satisfied.
    let mut payload = vec![0u8; length];
    let mut offset = 0;
    while offset < length {
        let chunk = (length - offset).min(8192);
        server
            .recv(sock, &mut payload[offset..offset + chunk])
            .expect("Error receiving payload");
        offset += chunk;
    }

    let in_order = payload
        .iter()
        .enumerate()
        .all(|(i, &byte)| byte == b'a' + (i % 23) as u8);

    logging::info!(log, "payload received"; "bytes" => length, "in_order" => in_order);

    thread::sleep(WAITTIME);
    match server.close(sock) {
        Ok(()) => logging::info!(log, "server socket closed"),
        Err(error) => logging::warn!(log, "close failed"; "error" => ?error),
    }
}
