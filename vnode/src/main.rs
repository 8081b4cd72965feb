use library::config;
use library::driver::TcpDriver;
use library::node::Node;
use library::utils::Packet;
use std::env;
use std::io::Result;
use std::process::exit;
use std::sync::Arc;

mod repl;

fn main() {
    //Flags: -agg turns on route aggregation, -d/-debug turns on debug logging
    let mut aggregate = false;
    let mut debug = false;
    let mut linkfile = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-agg" | "--agg" => aggregate = true,
            "-d" | "-debug" | "--debug" => debug = true,
            _ => linkfile = Some(arg),
        }
    }
    let Some(linkfile) = linkfile else {
        eprintln!("usage: vnode [-agg] [-d|-debug] <linkfile>");
        exit(1);
    };
    //The handle has to stay alive for the lifetime of the process
    let _logger = flexi_logger::Logger::try_with_str(if debug { "debug" } else { "info" })
        .expect("valid log level")
        .start()
        .expect("logger init failed");

    let config = match config::parse_link_file(&linkfile) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error reading link file: {e}");
            exit(1);
        }
    };
    let node = match Node::new(config) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            eprintln!("error initializing node: {e}");
            exit(1);
        }
    };
    node.set_aggregate(aggregate);
    node.register_handler(0, Box::new(test_data_handler));
    let driver = TcpDriver::new(Arc::clone(&node));
    for (i, iface) in node.interfaces.iter().enumerate() {
        println!("{}: {}", i, iface.addr);
    }
    node.run();
    repl::run(node, driver);
    exit(0);
}

///Protocol 0 carries test payloads; all we do is show them off
fn test_data_handler(_node: &Node, pack: Packet, link_id: usize) -> Result<()> {
    println!("---Node received packet!---");
    println!("        arrived link   : {}", link_id);
    println!("        source IP      : {}", pack.src());
    println!("        destination IP : {}", pack.dst());
    println!("        protocol       : {}", pack.header.protocol.0);
    println!("        payload length : {}", pack.data.len());
    println!("        payload        : {}", String::from_utf8_lossy(&pack.data));
    println!("---------------------------");
    Ok(())
}
