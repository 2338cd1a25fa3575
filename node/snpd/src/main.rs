use argon::logging;
use clap::{App, Arg};
use muon::config::NodeConfig;
use muon::network::daemon;
use muon::topology::Topology;
use std::net::Ipv4Addr;

pub fn main() {
    let matches = App::new("SNP Node")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the network (SNP) process of one node.")
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

    logging::info!(log, "network process starting"; "node" => topo.my_node());

    if let Err(error) = daemon::run(&topo, my_ip, &log) {
        logging::error!(log, "network process failed"; "error" => ?error);
        std::process::exit(1);
    }
}
