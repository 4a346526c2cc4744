//! Custom IP location database
//!
//! Three plain-text files, one `address location` pair per line, `#` for
//! comments:
//!
//! - `iplocation-custom.txt`: exact addresses or `a.b.c.d/n` subnets
//! - `iplocation-custom-C.txt`: any address inside the /24
//! - `iplocation-custom-B.txt`: any address inside the /16
//!
//! Lookups try exact, then C-class, then B-class.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;

use super::IpLocator;

const EXACT_FILE: &str = "iplocation-custom.txt";
const C_CLASS_FILE: &str = "iplocation-custom-C.txt";
const B_CLASS_FILE: &str = "iplocation-custom-B.txt";

/// Subnets in the exact file larger than this are ignored
const MIN_EXACT_PREFIX: u8 = 16;

#[derive(Debug, Default, Clone)]
pub struct CustomIpLocation {
    exact: HashMap<Ipv4Addr, String>,
    c_class: HashMap<[u8; 3], String>,
    b_class: HashMap<[u8; 2], String>,
}

impl CustomIpLocation {
    /// Load the files from a directory; missing files are logged and skipped
    pub fn load(dir: &Path) -> Self {
        let mut location = Self::default();

        if let Some(content) = read_file(dir, EXACT_FILE) {
            location.add_exact(&content);
        }
        if let Some(content) = read_file(dir, C_CLASS_FILE) {
            location.add_c_class(&content);
        }
        if let Some(content) = read_file(dir, B_CLASS_FILE) {
            location.add_b_class(&content);
        }

        tracing::info!(
            exact = location.exact.len(),
            c_class = location.c_class.len(),
            b_class = location.b_class.len(),
            "Loaded custom IP locations from {:?}",
            dir
        );
        location
    }

    fn add_exact(&mut self, content: &str) {
        for (addr, place) in entries(content) {
            if let Ok(ip) = addr.parse::<Ipv4Addr>() {
                self.exact.insert(ip, place.to_string());
            } else if let Ok(net) = addr.parse::<Ipv4Net>() {
                if net.prefix_len() < MIN_EXACT_PREFIX {
                    tracing::warn!("Ignoring oversized location subnet {}", net);
                    continue;
                }
                for ip in net.hosts() {
                    self.exact.insert(ip, place.to_string());
                }
            }
        }
    }

    fn add_c_class(&mut self, content: &str) {
        for (addr, place) in entries(content) {
            if let Ok(ip) = addr.parse::<Ipv4Addr>() {
                let [a, b, c, _] = ip.octets();
                self.c_class.insert([a, b, c], place.to_string());
            }
        }
    }

    fn add_b_class(&mut self, content: &str) {
        for (addr, place) in entries(content) {
            if let Ok(ip) = addr.parse::<Ipv4Addr>() {
                let [a, b, _, _] = ip.octets();
                self.b_class.insert([a, b], place.to_string());
            }
        }
    }
}

impl IpLocator for CustomIpLocation {
    fn locate(&self, ip: &str) -> Option<String> {
        let ip: Ipv4Addr = ip.parse().ok()?;
        let [a, b, c, _] = ip.octets();
        self.exact
            .get(&ip)
            .or_else(|| self.c_class.get(&[a, b, c]))
            .or_else(|| self.b_class.get(&[a, b]))
            .cloned()
    }
}

fn read_file(dir: &Path, name: &str) -> Option<String> {
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!("Failed to read {:?}: {}", path, e);
            None
        }
    }
}

/// `address location` pairs, skipping blanks and comments
fn entries(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some((fields.next()?, fields.next()?))
        })
}
