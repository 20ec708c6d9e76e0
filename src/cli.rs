//! Command line interface

use clap::{Arg, ArgMatches, ErrorKind};
use std::ffi::OsString;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ProbeError;
use crate::logger::StdLogger;
use crate::{Config, Family, Target};

/// Default time to live, or hop limit on IPv6
pub const DEFAULT_TTL: u8 = 64;

/// Default interval between probes, in seconds
pub const DEFAULT_INTERVAL: &str = "1";

/// Application initialization
pub struct App;

impl App {
    /// Retrieve user input from command line
    ///
    /// The user can modify the following parameters of the application:
    /// - destination: Either as IP address or domain name (required)
    /// - ttl: The time to live, or hop limit on IPv6 (default 64)
    /// - interval: Seconds between two probes, fractions allowed (default 1)
    /// - ipv4 / ipv6: Restrict name resolution to one address family
    /// - verbose: Repeat to see more diagnostics
    pub fn parse_args() -> Result<Config, ProbeError> {
        Self::parse_args_from(std::env::args_os())
    }

    /// Parse an explicit argument list, the first item being the program name
    pub fn parse_args_from<I, T>(args: I) -> Result<Config, ProbeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        // Define CLI interface here
        let app = clap_app!(probe =>
            (version: crate_version!())
            (about: "Measure round-trip latency to a host with ICMP echo requests")
            (@arg destination: +required "Host name or destination address")
            (@arg verbose: -v --verbose +multiple "Increases the level of verbosity")
            (@arg ttl: -t --ttl +takes_value "Sets the time to live (hop limit on IPv6)")
            (@arg interval: -i --interval +takes_value "Seconds between two echo requests"))
        .arg(
            Arg::with_name("ipv4")
                .short("4")
                .help("Resolve destination to an IPv4 address only"),
        )
        .arg(
            Arg::with_name("ipv6")
                .short("6")
                .conflicts_with("ipv4")
                .help("Resolve destination to an IPv6 address only"),
        );

        let matches = app.get_matches_from_safe(args)?;

        StdLogger::init(matches.occurrences_of("verbose"));

        let config = Config {
            ttl: parse_ttl(&matches)?,
            interval: parse_interval(&matches)?,
            target: parse_target(&matches),
            family: parse_family(&matches),
        };

        if let (Target::Ip(addr), Some(family)) = (&config.target, config.family) {
            if Family::of(addr) != family {
                return Err(usage(format!("{} is not an {} address", addr, family)));
            }
        }

        trace!("Parsed configuration.");

        Ok(config)
    }
}

fn usage(message: String) -> ProbeError {
    ProbeError::Usage(clap::Error::with_description(
        &message,
        ErrorKind::InvalidValue,
    ))
}

fn parse_ttl(matches: &ArgMatches) -> Result<u8, ProbeError> {
    match matches.value_of("ttl") {
        None => Ok(DEFAULT_TTL),
        Some(val) => match val.parse::<u8>() {
            Ok(ttl) if ttl > 0 => Ok(ttl),
            _ => Err(usage(format!("invalid ttl '{}': expected 1 to 255", val))),
        },
    }
}

fn parse_interval(matches: &ArgMatches) -> Result<Duration, ProbeError> {
    let val = matches.value_of("interval").unwrap_or(DEFAULT_INTERVAL);
    let secs = val.parse::<f64>().ok();
    match secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok()) {
        Some(interval) if interval > Duration::from_secs(0) => Ok(interval),
        _ => Err(usage(format!(
            "invalid interval '{}': expected a positive number of seconds",
            val
        ))),
    }
}

fn parse_target(matches: &ArgMatches) -> Target {
    // Clap guarantees a required value is present
    let val = matches.value_of("destination").unwrap_or_default();

    // If the input provided is not a valid destination, it will fail during dns resolution
    match val.parse::<IpAddr>() {
        Ok(addr) => Target::Ip(addr),
        Err(_) => Target::Host(val.to_string()),
    }
}

fn parse_family(matches: &ArgMatches) -> Option<Family> {
    if matches.is_present("ipv4") {
        Some(Family::V4)
    } else if matches.is_present("ipv6") {
        Some(Family::V6)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn parse(args: &[&str]) -> Result<Config, ProbeError> {
        App::parse_args_from(std::iter::once("probe").chain(args.iter().copied()))
    }

    #[test]
    fn default_config() {
        let config = parse(&["127.0.0.1"]).unwrap();
        assert_eq!(config.ttl, 64);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.target, Target::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert_eq!(config.family, None);
    }

    #[test]
    fn custom_ttl_and_interval() {
        let config = parse(&["--ttl", "3", "--interval", "0.25", "example.com"]).unwrap();
        assert_eq!(config.ttl, 3);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.target, Target::Host("example.com".to_string()));
    }

    #[test]
    fn short_flags() {
        let config = parse(&["-6", "-t", "10", "-i", "2", "-vv", "::1"]).unwrap();
        assert_eq!(config.ttl, 10);
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.family, Some(Family::V6));
        assert_eq!(config.target, Target::Ip("::1".parse().unwrap()));
    }

    #[test]
    fn missing_destination_is_a_usage_error() {
        assert!(matches!(parse(&[]), Err(ProbeError::Usage(_))));
    }

    #[test]
    fn invalid_values_are_usage_errors() {
        for args in &[
            &["--ttl", "0", "localhost"][..],
            &["--ttl", "256", "localhost"],
            &["--ttl", "many", "localhost"],
            &["--interval", "0", "localhost"],
            &["--interval", "-1", "localhost"],
            &["--interval", "NaN", "localhost"],
            &["-4", "-6", "localhost"],
            &["-4", "::1"],
        ] {
            assert!(
                matches!(parse(args), Err(ProbeError::Usage(_))),
                "accepted {:?}",
                args
            );
        }
    }
}
