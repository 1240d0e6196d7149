mod args;
mod terminal;

use anyhow::Context;
use is_root::is_root;
use sondr_common::network::target;
use sondr_core::engine::Engine;
use tracing::{info, warn};

use args::CommandLine;
use terminal::{logging, print};

fn main() -> anyhow::Result<()> {
    let args = CommandLine::parse_args();
    logging::init(args.verbose);

    if args.needs_privileges() && !is_root() {
        warn!("Ping and ARP need raw sockets; those probes will fail without root");
    }

    let collection = args
        .target
        .to_collection()
        .context("failed to resolve targets")?;
    let mut hosts = target::to_hosts(&collection);
    for host in &mut hosts {
        args.add_services(host);
    }

    let services: usize = hosts.iter().map(|host| host.services.len()).sum();
    print::header("starting scan");
    info!("{} host(s), {services} probe(s)", hosts.len());

    Engine::new(&args.scan_config()).scan(&mut hosts);

    print::results(&hosts);
    Ok(())
}
