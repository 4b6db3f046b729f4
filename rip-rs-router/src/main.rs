mod frames;
mod subscriber;

use crate::subscriber::RouterSubscriber;
use clap::{App, Arg, ArgMatches};
use crossbeam::channel::unbounded;
use rip_rs_runtime::config::{self, ConfigError, RouterConfig};
use rip_rs_runtime::utils::runner::{run_router, RouterEvent};
use rip_rs_runtime::{ChannelTransmitter, Router};
use std::io;
use std::path::Path;
use std::process;
use std::thread;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] io::Error),
}

fn main() {
    // Collect arguments from user
    let matches = App::new("rip-rs router")
        .version("0.1")
        .author("rip-rs contributors")
        .about("IPv4 router speaking ARP, ICMP and RIPv2 over frames read from stdin")
        .arg(
            Arg::with_name("interfaces")
                .short("i")
                .long("interfaces")
                .value_name("FILE")
                .help("Interface file, one `name mac ip mask` per line")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("route_table")
                .short("r")
                .long("route-table")
                .value_name("FILE")
                .help("Static routes, one `destination gateway mask interface` per line. Without it RIP runs")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("arp_cache")
                .short("a")
                .long("arp-cache")
                .value_name("FILE")
                .help("Static ARP entries, one `ip mac` per line")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("proxy_arp")
                .long("proxy-arp")
                .help("Answer ARP requests for addresses routed out of another interface"),
        )
        .arg(
            Arg::with_name("split_horizon")
                .long("split-horizon")
                .help("Advertise routes back toward their gateway as unreachable"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every dropped frame and state change"),
        )
        .get_matches();

    let subscriber = RouterSubscriber::new(matches.is_present("verbose"));
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    if let Err(err) = run(&matches) {
        eprintln!("rip-rs-router: {}", err);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), StartupError> {
    let interfaces = config::load_interfaces(Path::new(matches.value_of("interfaces").unwrap()))?;
    let config = RouterConfig {
        proxy_arp: matches.is_present("proxy_arp"),
        split_horizon: matches.is_present("split_horizon"),
        ..RouterConfig::default()
    };

    // One writer thread per interface prints whatever the router transmits there
    let mut transmitter = ChannelTransmitter::new();
    let mut writers = vec![];
    for iface in interfaces.iter() {
        let (sender, receiver) = unbounded();
        transmitter.add_sender(&iface.name, sender);
        let name = iface.name.clone();
        writers.push(thread::spawn(move || {
            for frame in receiver.iter() {
                println!("{}", frames::format_line(&name, &frame));
            }
        }));
    }

    let mut router = Router::new(interfaces, transmitter, config);
    if let Some(path) = matches.value_of("arp_cache") {
        router.load_arp_cache(Path::new(path))?;
    }
    match matches.value_of("route_table") {
        Some(path) => router.load_route_table(Path::new(path))?,
        None => router.start_rip(),
    }

    let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async move {
        let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(read_frames(events));
        let router = run_router(router, receiver).await;
        info!(routes = router.route_table().len(), "final route table\n{}", router.route_table());
    });

    // The router, and with it every sender, is gone, so the writers drain and stop
    for writer in writers {
        let _ = writer.join();
    }
    Ok(())
}

async fn read_frames(events: UnboundedSender<RouterEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match frames::parse_line(&line) {
                Ok((iface, frame)) => {
                    if events.send(RouterEvent::Frame { frame, iface }).is_err() {
                        return;
                    }
                }
                Err(reason) => warn!(reason, "ignoring input line"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "could not read stdin");
                break;
            }
        }
    }
    let _ = events.send(RouterEvent::Shutdown);
}
