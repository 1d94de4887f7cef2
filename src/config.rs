use std::fmt::Display;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, File};
use flexi_logger::filter::{LogLineFilter, LogLineWriter};
use flexi_logger::{DeferredNow, LoggerHandle};
use serde::{Deserialize, Serialize};

use crate::multicast::MdnsInterface;
use crate::resolver::select_nameserver;
use crate::{DNS_PORT, MDNS_PORT};

/// Where we go looking for config when nobody hands us a path.
const CONFIG_LOCATIONS: [&str; 2] = ["./goatherd.json", "~/.config/goatherd.json"];

#[derive(Debug, Deserialize, Eq, PartialEq, Clone, Serialize)]
/// The main config blob for goatherd, write this as a JSON file and load it
/// and it'll make things go.
pub struct ConfigFile {
    /// Ordered list of nameservers for unicast queries. Feeding this from
    /// `/etc/resolv.conf` is somebody else's job - we just take addresses.
    pub nameservers: Vec<IpAddr>,
    /// Unicast DNS port, default is 53
    pub port: u16,
    /// mDNS port, default is 5353. You'd only change this for tests.
    pub mdns_port: u16,
    /// How many seconds a query waits before the registry fails it, default 30
    pub query_timeout_seconds: u64,
    /// Suppress our own multicast traffic on responder channels
    pub ignore_self: bool,
    /// IPv4 interface addresses to join the mDNS group on. Empty means one
    /// channel with the kernel picking the interface.
    pub mdns_interfaces: Vec<Ipv4Addr>,
    /// IPv6 interface indexes to join the mDNS group on. Index-only, so
    /// the v6 self-traffic check stays off for config-driven responders;
    /// pass the interface address through [crate::multicast::MdnsInterface]
    /// directly if you need it.
    pub mdns_v6_interfaces: Vec<u32>,
    /// If we should capture packets on request/response
    pub capture_packets: bool,
    /// Default is "INFO"
    pub log_level: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            nameservers: vec![],
            port: DNS_PORT,
            mdns_port: MDNS_PORT,
            query_timeout_seconds: 30,
            ignore_self: false,
            mdns_interfaces: vec![],
            mdns_v6_interfaces: vec![],
            capture_packets: false,
            log_level: "INFO".to_string(),
        }
    }
}

impl Display for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "nameservers={:?} port={} mdns_port={} query_timeout={}s ignore_self={} capturing_pcaps={} log_level={}",
            self.nameservers,
            self.port,
            self.mdns_port,
            self.query_timeout_seconds,
            self.ignore_self,
            self.capture_packets,
            self.log_level
        ))
    }
}

impl ConfigFile {
    /// JSONify the configfile in a pretty way using serde
    pub fn as_json_pretty(&self) -> Result<String, crate::error::GoatHerdError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::GoatHerdError::UnableToParseConfig(format!(
                "Failed to serialize config: {e:?}"
            ))
        })
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    /// The nameserver the client should talk to, as a bindable target.
    pub fn nameserver_address(&self) -> Result<SocketAddr, crate::error::GoatHerdError> {
        let selected = select_nameserver(&self.nameservers)?;
        Ok(SocketAddr::new(selected, self.port))
    }

    /// Every interface the responder should fan out over. With nothing
    /// configured you get one IPv4 channel on the kernel's default.
    pub fn responder_interfaces(&self) -> Vec<MdnsInterface> {
        let mut interfaces: Vec<MdnsInterface> = self
            .mdns_interfaces
            .iter()
            .map(|addr| MdnsInterface::V4(*addr))
            .collect();
        interfaces.extend(self.mdns_v6_interfaces.iter().map(|index| {
            MdnsInterface::V6 {
                index: *index,
                addr: std::net::Ipv6Addr::UNSPECIFIED,
            }
        }));
        if interfaces.is_empty() {
            interfaces.push(MdnsInterface::V4(Ipv4Addr::UNSPECIFIED));
        }
        interfaces
    }

    /// Sanity-check the loaded config, collecting everything wrong with it.
    pub fn check_config(&self) -> Result<(), Vec<String>> {
        let mut errors: Vec<String> = vec![];

        if self.port == 0 {
            errors.push("port 0 isn't going to reach a nameserver".to_string());
        }
        if self.query_timeout_seconds == 0 {
            errors.push("query_timeout_seconds of 0 would fail every query on arrival".to_string());
        }
        match errors.is_empty() {
            true => Ok(()),
            false => Err(errors),
        }
    }

    /// Loads the configuration from a given file or from some default locations.
    ///
    /// The default locations are `./goatherd.json` and `~/.config/goatherd.json`.
    pub fn try_from_path(config_path: Option<&String>) -> Result<ConfigFile, std::io::Error> {
        let file_locations = match config_path {
            Some(value) => vec![value.to_owned()],
            None => CONFIG_LOCATIONS.iter().map(|x| x.to_string()).collect(),
        };

        // clean up the file paths and filter them by the ones that exist
        let found_files: Vec<String> = file_locations
            .iter()
            .filter_map(|f| {
                let path = shellexpand::tilde(&f).into_owned();
                let filepath = std::path::Path::new(&path);
                match filepath.exists() {
                    false => {
                        eprintln!("Config file {path} doesn't exist, skipping.");
                        None
                    }
                    true => Some(path),
                }
            })
            .collect();

        if found_files.is_empty() {
            eprintln!(
                "No configuration files exist, giving up! Tried: {}",
                file_locations.join(", ")
            );
            return Err(std::io::Error::new(
                ErrorKind::NotFound,
                "No configuration files found",
            ));
        }

        for filepath in found_files {
            let config_filename: String = shellexpand::tilde(&filepath).into_owned();

            let builder = Config::builder()
                .add_source(File::new(&config_filename, config::FileFormat::Json))
                .add_source(config::Environment::with_prefix("goatherd"));

            match builder.build() {
                Ok(config) => return Ok(config.into()),
                Err(error) => {
                    return Err(std::io::Error::other(format!(
                        "Couldn't load config from {config_filename}: {error:?}"
                    )))
                }
            }
        }

        Err(std::io::Error::new(
            ErrorKind::NotFound,
            "No configuration files found",
        ))
    }
}

impl From<Config> for ConfigFile {
    fn from(config: Config) -> Self {
        ConfigFile {
            nameservers: config
                .get("nameservers")
                .unwrap_or(Self::default().nameservers),
            port: config.get("port").unwrap_or(Self::default().port),
            mdns_port: config.get("mdns_port").unwrap_or(Self::default().mdns_port),
            query_timeout_seconds: config
                .get("query_timeout_seconds")
                .unwrap_or(Self::default().query_timeout_seconds),
            ignore_self: config
                .get("ignore_self")
                .unwrap_or(Self::default().ignore_self),
            mdns_interfaces: config
                .get("mdns_interfaces")
                .unwrap_or(Self::default().mdns_interfaces),
            mdns_v6_interfaces: config
                .get("mdns_v6_interfaces")
                .unwrap_or(Self::default().mdns_v6_interfaces),
            capture_packets: config
                .get("capture_packets")
                .unwrap_or(Self::default().capture_packets),
            log_level: config.get("log_level").unwrap_or(Self::default().log_level),
        }
    }
}

impl FromStr for ConfigFile {
    type Err = crate::error::GoatHerdError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let configfile = File::from_str(input, config::FileFormat::Json);

        let res = Config::builder()
            .add_source(configfile)
            .build()
            .map_err(|e| crate::error::GoatHerdError::UnableToParseConfig(format!("{e:?}")))?;

        Ok(res.into())
    }
}

/// Start the logger, honouring the config's level unless the CLI asked for debug.
pub fn setup_logging(config: &ConfigFile, debug: bool) -> Result<LoggerHandle, std::io::Error> {
    let log_level = match debug {
        true => "debug".to_string(),
        false => config.log_level.to_ascii_lowercase(),
    };

    let logger = flexi_logger::Logger::try_with_str(log_level)
        .map_err(|e| std::io::Error::other(format!("Failed to start logger! {e:?}")))?;

    logger
        .write_mode(flexi_logger::WriteMode::Async)
        .filter(Box::new(LogFilter {
            filters: vec!["h2", "hyper::proto"],
        }))
        .set_palette("b1;3;2;6;5".to_string())
        .start()
        .map_err(|e| std::io::Error::other(format!("Failed to start logger! {e:?}")))
}

pub struct LogFilter {
    filters: Vec<&'static str>,
}

impl LogLineFilter for LogFilter {
    fn write(
        &self,
        now: &mut DeferredNow,
        record: &log::Record,
        log_line_writer: &dyn LogLineWriter,
    ) -> std::io::Result<()> {
        if self
            .filters
            .iter()
            .any(|r| record.metadata().target().starts_with(r))
        {
            return Ok(());
        }
        log_line_writer.write(now, record)?;
        Ok(())
    }
}
