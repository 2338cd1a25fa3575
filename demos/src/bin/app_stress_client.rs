//! Stress client demo: one SRT connection carrying a length-prefixed bulk
//! buffer, meant to be run with a nonzero loss rate so the Go-Back-N
//! machinery actually works for a living.

use argon::logging;
use byteorder::{BigEndian, WriteBytesExt};
use clap::{App, Arg};
use muon::config::OVERLAY_PORT;
use muon::seg::LossProfile;
use muon::transport::{segment_link, SrtClient};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

const CLIENTPORT: u16 = 87;
const SVRPORT: u16 = 88;

const PAYLOAD_LEN: usize = 100_000;
const WAITTIME: Duration = Duration::from_secs(10);

pub fn main() {
    let matches = App::new("Stress SRT Client")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Pushes a bulk buffer through one SRT connection.")
        .arg(
            Arg::with_name("SERVER")
                .help("Server host to connect to")
                .required(true),
        )
        .arg(
            Arg::with_name("loss")
                .long("loss")
                .takes_value(true)
                .help("Received-segment loss rate (default 0.1)"),
        )
        .get_matches();

    let server_host = matches.value_of("SERVER").unwrap();
    let loss: f64 = matches.value_of("loss").unwrap_or("0.1").parse().expect("Error parsing loss rate");
    let log = logging::init();

    let stream = TcpStream::connect((server_host, OVERLAY_PORT)).expect("Error connecting to server");
    let (tx, rx) = segment_link(stream, LossProfile::new(loss), &log).expect("Error splitting link");
    let client = SrtClient::new(tx, rx, 0, &log);

    let sock = client.sock(CLIENTPORT).expect("Error opening client socket");
    client.connect(sock, SVRPORT).expect("Error connecting");
    logging::info!(log, "connection up"; "server_port" => SVRPORT);

    let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|i| b'a' + (i % 23) as u8).collect();

    let mut length_prefix = Vec::with_capacity(4);
    length_prefix.write_u32::<BigEndian>(PAYLOAD_LEN as u32).unwrap();

    client.send(sock, &length_prefix).expect("Error sending length");
    client.send(sock, &payload).expect("Error sending payload");
    logging::info!(log, "payload queued"; "bytes" => PAYLOAD_LEN);

    // Let the window drain through whatever the loss rate does to it.
    thread::sleep(WAITTIME);

    client.disconnect(sock).expect("Error disconnecting");
    client.close(sock).expect("Error closing socket");

    logging::info!(log, "stress client done");
}
