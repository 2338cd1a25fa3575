//! Simple client demo: dials the server directly over TCP in place of a
//! full overlay, opens two SRT connections and sends five short strings on
//! each, then tears both down.

use argon::logging;
use clap::{App, Arg};
use muon::config::OVERLAY_PORT;
use muon::seg::LossProfile;
use muon::transport::{segment_link, SrtClient};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

const CLIENTPORT1: u16 = 87;
const SVRPORT1: u16 = 88;
const CLIENTPORT2: u16 = 89;
const SVRPORT2: u16 = 90;

const WAITTIME: Duration = Duration::from_secs(5);

pub fn main() {
    let matches = App::new("Simple SRT Client")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Sends short strings over two SRT connections.")
        .arg(
            Arg::with_name("SERVER")
                .help("Server host to connect to")
                .required(true),
        )
        .arg(
            Arg::with_name("loss")
                .long("loss")
                .takes_value(true)
                .help("Received-segment loss rate (default 0)"),
        )
        .get_matches();

    let server_host = matches.value_of("SERVER").unwrap();
    let loss: f64 = matches.value_of("loss").unwrap_or("0").parse().expect("Error parsing loss rate");
    let log = logging::init();

    let stream = TcpStream::connect((server_host, OVERLAY_PORT)).expect("Error connecting to server");
    logging::info!(log, "server link up"; "host" => server_host);

    let (tx, rx) = segment_link(stream, LossProfile::new(loss), &log).expect("Error splitting link");
    let client = SrtClient::new(tx, rx, 0, &log);

    let sock1 = client.sock(CLIENTPORT1).expect("Error opening client socket");
    client.connect(sock1, SVRPORT1).expect("Error connecting");
    logging::info!(log, "connection 1 up"; "server_port" => SVRPORT1);

    let sock2 = client.sock(CLIENTPORT2).expect("Error opening client socket");
    client.connect(sock2, SVRPORT2).expect("Error connecting");
    logging::info!(log, "connection 2 up"; "server_port" => SVRPORT2);

    for _ in 0..5 {
        client.send(sock1, b"hello ").expect("Error sending");
    }
    for _ in 0..5 {
        client.send(sock2, b"sevens ").expect("Error sending");
    }

    // Let the windows drain before tearing down.
    thread::sleep(WAITTIME);

    client.disconnect(sock1).expect("Error disconnecting");
    client.close(sock1).expect("Error closing socket");
    client.disconnect(sock2).expect("Error disconnecting");
    client.close(sock2).expect("Error closing socket");

    logging::info!(log, "client done");
}
