use argon::logging;
use clap::{App, Arg};
use muon::config::NodeConfig;
use muon::overlay;
use muon::topology::Topology;
use std::net::Ipv4Addr;

pub fn main() {
    let matches = App::new("Overlay Node")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the overlay (ON) process of one node.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the node config file")
                .required(true),
        )
        .get_matches();

    let config = NodeConfig::load(matches.value_of("CONFIG_FILE").unwrap());
    let my_ip: Ipv4Addr = config.host_ip.parse().expect("Error parsing host_ip");
    let topo = Topology::load(&config.topology, my_ip).expect("Error loading topology file");

    let log = logging::init();

    logging::info!(log, "overlay process starting"; "node" => topo.my_node());

    if let Err(error) = overlay::run(&topo, &log) {
        logging::error!(log, "overlay process failed"; "error" => ?error);
        std::process::exit(1);
    }
}
