//! Simple server demo: accepts the client's direct TCP link in place of a
//! full overlay, brings up an SRT server endpoint, takes two connections
//! and prints the short strings arriving on each.

use argon::logging;
use clap::{App, Arg};
use muon::config::OVERLAY_PORT;
use muon::seg::LossProfile;
use muon::transport::{segment_link, SrtServer};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::Duration;

const CLIENTPORT1: u16 = 87;
const SVRPORT1: u16 = 88;
const CLIENTPORT2: u16 = 89;
const SVRPORT2: u16 = 90;

const WAITTIME: Duration = Duration::from_secs(10);

pub fn main() {
    let matches = App::new("Simple SRT Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Receives short strings over two SRT connections.")
        .arg(
            Arg::with_name("loss")
                .long("loss")
                .takes_value(true)
                .help("Received-segment loss rate (default 0)"),
        )
        .get_matches();

    let loss: f64 = matches.value_of("loss").unwrap_or("0").parse().expect("Error parsing loss rate");
    let log = logging::init();

    // The direct TCP connection from the client stands in for the overlay.
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, OVERLAY_PORT)).expect("Error binding overlay port");
    logging::info!(log, "waiting for client link"; "port" => OVERLAY_PORT);
    let (stream, peer) = listener.accept().expect("Error accepting client link");
    logging::info!(log, "client link up"; "peer" => %peer);

    let (tx, rx) = segment_link(stream, LossProfile::new(loss), &log).expect("Error splitting link");
    let server = SrtServer::new(tx, rx, &log);

    let sock1 = server.sock(SVRPORT1).expect("Error opening server socket");
    server.accept(sock1).expect("Error accepting connection");
    logging::info!(log, "connection 1 accepted"; "client_port" => CLIENTPORT1);

    let sock2 = server.sock(SVRPORT2).expect("Error opening server socket");
    server.accept(sock2).expect("Error accepting connection");
    logging::info!(log, "connection 2 accepted"; "client_port" => CLIENTPORT2);

    let mut buf1 = [0u8; 6];
    for _ in 0..5 {
        server.recv(sock1, &mut buf1).expect("Error receiving");
        logging::info!(log, "received"; "connection" => 1, "data" => %String::from_utf8_lossy(&buf1));
    }

    let mut buf2 = [0u8; 7];
    for _ in 0..5 {
        server.recv(sock2, &mut buf2).expect("Error receiving");
        logging::info!(log, "received"; "connection" => 2, "data" => %String::from_utf8_lossy(&buf2));
    }

    // Give the client time to tear both connections down.
    thread::sleep(WAITTIME);

    match (server.close(sock1), server.close(sock2)) {
        (Ok(()), Ok(())) => logging::info!(log, "server sockets closed"),
        (first, second) => {
            logging::warn!(log, "close failed"; "first" => ?first, "second" => ?second)
        }
    }
}
