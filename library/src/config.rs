use crate::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};

///Parsed form of a link file. The first line names our own UDP endpoint; each
///following line declares one point-to-point link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub host: String,
    pub udp_port: u16,
    pub links: Vec<LinkEntry>,
}

#[derive(Debug, Clone)]
pub struct LinkEntry {
    pub peer_host: String,
    pub peer_port: u16,
    pub local_vip: Ipv4Addr,
    pub peer_vip: Ipv4Addr,
}

pub fn parse_link_file(path: &str) -> Result<LinkConfig> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();
    let first = lines
        .next()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "empty link file"))??;
    let mut tokens = first.split_whitespace();
    let host = tokens
        .next()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing hostname"))?
        .to_string();
    let udp_port = tokens
        .next()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing udp port"))?
        .parse()
        .map_err(|_| Error::new(ErrorKind::InvalidData, "bad udp port"))?;
    let mut links = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 4 {
            return Err(Error::new(ErrorKind::InvalidData, "malformed link line"));
        }
        links.push(LinkEntry {
            peer_host: tokens[0].to_string(),
            peer_port: tokens[1]
                .parse()
                .map_err(|_| Error::new(ErrorKind::InvalidData, "bad peer udp port"))?,
            local_vip: tokens[2]
                .parse()
                .map_err(|_| Error::new(ErrorKind::InvalidData, "bad local vip"))?,
            peer_vip: tokens[3]
                .parse()
                .map_err(|_| Error::new(ErrorKind::InvalidData, "bad peer vip"))?,
        });
    }
    Ok(LinkConfig {
        host,
        udp_port,
        links,
    })
}
