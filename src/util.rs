use std::{
    net::{IpAddr, Ipv4Addr},
    str::FromStr,
};

const BEACON_ADDR: &str = "BEACON_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_default_addr() -> IpAddr {
    IpAddr::V4(DEFAULT_ADDR)
}

pub fn get_addr() -> Option<IpAddr> {
    env_parsed(BEACON_ADDR)
}

const BEACON_PUSH_PORT: &str = "BEACON_PUSH_PORT";

const DEFAULT_PUSH_PORT: u16 = 3012;

pub fn get_default_push_port() -> u16 {
    DEFAULT_PUSH_PORT
}

pub fn get_push_port() -> Option<u16> {
    env_parsed(BEACON_PUSH_PORT)
}

const BEACON_QUERY_PORT: &str = "BEACON_QUERY_PORT";

const DEFAULT_QUERY_PORT: u16 = 3013;

pub fn get_default_query_port() -> u16 {
    DEFAULT_QUERY_PORT
}

pub fn get_query_port() -> Option<u16> {
    env_parsed(BEACON_QUERY_PORT)
}

const BEACON_INTERVAL: &str = "BEACON_INTERVAL";

pub fn get_interval() -> Option<u64> {
    env_parsed(BEACON_INTERVAL)
}

const BEACON_CPU_THRESHOLD: &str = "BEACON_CPU_THRESHOLD";
const BEACON_MEMORY_THRESHOLD: &str = "BEACON_MEMORY_THRESHOLD";
const BEACON_DISK_THRESHOLD: &str = "BEACON_DISK_THRESHOLD";

pub fn get_cpu_threshold() -> Option<f64> {
    env_parsed(BEACON_CPU_THRESHOLD)
}

pub fn get_memory_threshold() -> Option<f64> {
    env_parsed(BEACON_MEMORY_THRESHOLD)
}

pub fn get_disk_threshold() -> Option<f64> {
    env_parsed(BEACON_DISK_THRESHOLD)
}

const BEACON_NOTIFY_URL: &str = "BEACON_NOTIFY_URL";

pub fn get_notify_url() -> Option<String> {
    std::env::var(BEACON_NOTIFY_URL).ok()
}

const BEACON_LOG: &str = "BEACON_LOG";

pub fn get_log_level() -> tracing::level_filters::LevelFilter {
    env_or(BEACON_LOG, tracing::level_filters::LevelFilter::INFO)
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_parsed(key).unwrap_or(default)
}

/// Format a byte count the way `df -h` does (`512M`, `1.5G`, `120G`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes}B")
    } else if value < 10.0 {
        format!("{value:.1}{}", UNITS[unit])
    } else {
        format!("{value:.0}{}", UNITS[unit])
    }
}
