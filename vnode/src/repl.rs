use library::conn::ShutdownKind;
use library::driver::TcpDriver;
use library::icmp;
use library::node::Node;
use library::utils::{MAX_FRAME_SIZE, MAX_PACKET_SIZE};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;

const HELP: &str = "Commands:
a <port>                       - Spawn a socket, bind it to the given port,
                                 and start accepting connections on that port.
c <ip> <port>                  - Attempt to connect to the given ip address,
                                 in dot notation, on the given port.
s <socket> <data>              - Send a string on a socket.
r <socket> <numbytes> [y|n]    - Try to read data from a given socket. If
                                 the last argument is y, block until numbytes
                                 is received or the connection closes.
sf <filename> <ip> <port>      - Connect to the given ip and port, send the
                                 entirety of the specified file, and close
                                 the connection.
rf <filename> <port>           - Listen for a connection on the given port.
                                 Once established, write everything read from
                                 the socket to the given file until the other
                                 side closes, then close as well.
sd <socket> [read|write|both]  - Shut down the given socket.
cl <socket>                    - Close the given socket.
send <ip> <protocol> <payload> - Send payload to the given virtual ip.
traceroute <vip>               - Trace the path to the given virtual ip.
up <id>                        - Enable the interface with the given id.
down <id>                      - Disable the interface with the given id.
li, interfaces                 - List interfaces.
lr, routes                     - List routing table rows.
ls, sockets                    - List sockets (fd, ip, port, state).
q, quit                        - Exit this node.
h, help                        - Show this help.";

pub fn run(node: Arc<Node>, driver: Arc<TcpDriver>) {
    let mut editor = match Editor::<(), DefaultHistory>::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("failed to start line editor: {e}");
            return;
        }
    };
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                if tokens.is_empty() {
                    continue;
                }
                if tokens[0] == "q" || tokens[0] == "quit" {
                    break;
                }
                handle_command(&node, &driver, &tokens);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{e:?}");
                break;
            }
        }
    }
}

fn handle_command(node: &Arc<Node>, driver: &Arc<TcpDriver>, tokens: &[String]) {
    match tokens[0].as_str() {
        "li" | "interfaces" => node.list_interfaces(),
        "lr" | "routes" => node.list_routes(),
        "ls" | "sockets" => driver.list_sockets(),
        "up" => {
            let Some(inum) = tokens.get(1).and_then(|t| t.parse().ok()) else {
                return println!("usage: up [integer]");
            };
            if let Err(e) = node.interface_up(inum) {
                println!("error: {e}");
            }
        }
        "down" => {
            let Some(inum) = tokens.get(1).and_then(|t| t.parse().ok()) else {
                return println!("usage: down [integer]");
            };
            if let Err(e) = node.interface_down(inum) {
                println!("error: {e}");
            }
        }
        "send" => {
            if tokens.len() < 4 {
                return println!("usage: send [ip] [protocol] [payload]");
            }
            let Ok(dst) = tokens[1].parse::<Ipv4Addr>() else {
                return println!("invalid ip address \"{}\"", tokens[1]);
            };
            let Ok(proto) = tokens[2].parse::<u8>() else {
                return println!("invalid protocol \"{}\"", tokens[2]);
            };
            node.send_data(dst, proto, tokens[3..].join(" ").into_bytes());
        }
        "traceroute" => {
            let Some(dst) = tokens.get(1).and_then(|t| t.parse().ok()) else {
                return println!("usage: traceroute vip");
            };
            icmp::traceroute(node, dst);
        }
        "a" => {
            let Some(port) = tokens.get(1).and_then(|t| t.parse().ok()) else {
                return println!("usage: a [port]");
            };
            match driver.listen(node.get_open_addr(), port) {
                Ok(listener) => {
                    thread::spawn(move || loop {
                        match listener.accept() {
                            Ok(sid) => println!("accept() on socket {sid} returned 1"),
                            Err(e) => {
                                println!("accept() returned error: {e}");
                                break;
                            }
                        }
                    });
                }
                Err(_) => println!("could not create listener"),
            }
        }
        "c" => {
            if tokens.len() < 3 {
                return println!("usage: c [ip] [port]");
            }
            let Ok(remote) = tokens[1].parse::<Ipv4Addr>() else {
                return println!("invalid ip address \"{}\"", tokens[1]);
            };
            let Ok(port) = tokens[2].parse::<u16>() else {
                return println!("invalid port \"{}\"", tokens[2]);
            };
            let local = node.get_open_addr();
            let lport = driver.next_ephemeral_port();
            match driver.connect(local, lport, remote, port) {
                Ok(_) => println!("connect() returned 0"),
                Err(e) => println!("connect() error: {e}"),
            }
        }
        "s" => {
            if tokens.len() < 3 {
                return println!("usage: s [socket] [data]");
            }
            let Ok(sid) = tokens[1].parse::<usize>() else {
                return println!("socket is not valid");
            };
            let Some(conn) = driver.get_conn_socket(sid) else {
                return println!("socket is not valid");
            };
            let data = tokens[2..].join(" ");
            match conn.write(data.as_bytes()) {
                Ok(n) => println!("write() on {} bytes returned {}", data.len(), n),
                Err(e) => println!("write() error: {e}"),
            }
        }
        "r" => {
            if tokens.len() < 3 {
                return println!("usage: r [socket] [numbytes] (y/n)");
            }
            let Ok(sid) = tokens[1].parse::<usize>() else {
                return println!("socket is not valid");
            };
            let Ok(bytes) = tokens[2].parse::<u32>() else {
                return println!("usage: r [socket] [numbytes] (y/n)");
            };
            let block = tokens.get(3).map_or(false, |t| t == "y");
            let Some(conn) = driver.get_conn_socket(sid) else {
                return println!("socket is not valid");
            };
            match conn.read(bytes, block) {
                Ok(data) => println!(
                    "read() on {} bytes returned {}; contents of buffer: '{}'",
                    bytes,
                    data.len(),
                    String::from_utf8_lossy(&data)
                ),
                Err(e) => println!("read() error: {e}"),
            }
        }
        "sd" => {
            if tokens.len() < 3 {
                return println!("usage: sd [socket] (read/write/both)");
            }
            let Ok(sid) = tokens[1].parse::<usize>() else {
                return println!("socket is not valid");
            };
            let kind = match tokens[2].as_str() {
                "read" => ShutdownKind::Read,
                "write" => ShutdownKind::Write,
                "both" => ShutdownKind::Both,
                _ => return println!("mode is not valid"),
            };
            match driver.get_conn_socket(sid) {
                Some(conn) => {
                    conn.shutdown(kind);
                    println!("shutdown() returned 0");
                }
                None => println!("socket is not valid"),
            }
        }
        "cl" => {
            let Some(sid) = tokens.get(1).and_then(|t| t.parse().ok()) else {
                return println!("usage: cl [socket]");
            };
            match driver.get_conn_socket(sid) {
                Some(conn) => conn.close(),
                None => println!("socket is not valid"),
            }
        }
        "sf" => cmd_send_file(node, driver, tokens),
        "rf" => cmd_recv_file(node, driver, tokens),
        _ => println!("{HELP}"),
    }
}

///Connect, stream the whole file across, close
fn cmd_send_file(node: &Arc<Node>, driver: &Arc<TcpDriver>, tokens: &[String]) {
    if tokens.len() < 4 {
        return println!("usage: sf [filename] [ip] [port]");
    }
    let mut file = match File::open(&tokens[1]) {
        Ok(file) => file,
        Err(e) => return println!("sf error: {e}"),
    };
    let Ok(remote) = tokens[2].parse::<Ipv4Addr>() else {
        return println!("sf error: invalid ip address");
    };
    let Ok(port) = tokens[3].parse::<u16>() else {
        return println!("sf error: invalid port");
    };
    let local = node.get_open_addr();
    let lport = driver.next_ephemeral_port();
    println!("STARTING SENDFILE");
    let conn = match driver.connect(local, lport, remote, port) {
        Ok(conn) => conn,
        Err(e) => return println!("sf error: {e}"),
    };
    thread::spawn(move || {
        let mut total = 0u64;
        let mut buf = vec![0u8; MAX_PACKET_SIZE as usize];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    println!("sf error: {e}");
                    break;
                }
            };
            match conn.write(&buf[..n]) {
                Ok(sent) => total += sent as u64,
                Err(e) => {
                    println!("sf error: {e}");
                    break;
                }
            }
        }
        conn.close();
        println!("FINISHED SENDFILE ({total} bytes)");
    });
}

///Listen, accept one connection, drain it into the file until EOF
fn cmd_recv_file(node: &Arc<Node>, driver: &Arc<TcpDriver>, tokens: &[String]) {
    if tokens.len() < 3 {
        return println!("usage: rf [filename] [port]");
    }
    let mut file = match File::create(&tokens[1]) {
        Ok(file) => file,
        Err(e) => return println!("rf error: {e}"),
    };
    let Ok(port) = tokens[2].parse::<u16>() else {
        return println!("rf error: invalid port");
    };
    let listener = match driver.listen(node.get_open_addr(), port) {
        Ok(listener) => listener,
        Err(_) => return println!("could not create listener"),
    };
    let driver = Arc::clone(driver);
    thread::spawn(move || {
        let sid = match listener.accept() {
            Ok(sid) => sid,
            Err(e) => return println!("accept() returned error: {e}"),
        };
        listener.close();
        let Some(conn) = driver.get_conn_socket(sid) else {
            return println!("rf error: accepted socket vanished");
        };
        let mut total = 0u64;
        loop {
            match conn.read(MAX_FRAME_SIZE as u32, true) {
                Ok(data) => {
                    total += data.len() as u64;
                    if let Err(e) = file.write_all(&data) {
                        println!("rf error: {e}");
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    println!("rf error: {e}");
                    break;
                }
            }
        }
        println!("FINISHED RECVFILE ({total} bytes)");
        conn.close();
    });
}
