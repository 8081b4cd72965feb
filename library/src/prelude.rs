pub use etherparse::{IpNumber, Ipv4Header, TcpHeader};
pub use ipnet::Ipv4Net;
pub use rand::Rng;
pub use std::cmp;
pub use std::collections::HashMap;
pub use std::io::{Error, ErrorKind, Result};
pub use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
pub use std::sync::{
    atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering},
    mpsc::{channel, Receiver, Sender},
    Arc, Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
pub use std::thread;
pub use std::time::{Duration, Instant};
