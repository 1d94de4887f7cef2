//! Typed lookups over the top of [DnsClient] - ask for a hostname, get
//! socket addresses back, no staring at resource records required.

use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};

use tracing::debug;

use crate::client::{ClientOptions, DnsClient};
use crate::config::ConfigFile;
use crate::enums::RecordType;
use crate::error::GoatHerdError;
use crate::message::Message;
use crate::name::DnsName;
use crate::rdata::RecordData;

/// One SRV answer, ready for "now go connect to it".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrvLookup {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: DnsName,
}

/// One TXT answer - the text, plus the `key=value` split when there was one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxtLookup {
    pub text: String,
    pub key: String,
    pub value: String,
}

/// Pick a nameserver out of an ordered list: the first IPv4 address wins,
/// otherwise whatever's first. An empty list gets you nowhere.
pub fn select_nameserver(nameservers: &[IpAddr]) -> Result<IpAddr, GoatHerdError> {
    if nameservers.is_empty() {
        return Err(GoatHerdError::MissingNameservers);
    }
    let selected = nameservers
        .iter()
        .find(|addr| addr.is_ipv4())
        .unwrap_or(&nameservers[0]);
    Ok(*selected)
}

/// High-level typed queries against one nameserver.
pub struct Resolver {
    client: DnsClient,
}

impl Resolver {
    pub fn new(client: DnsClient) -> Self {
        Resolver { client }
    }

    /// Build a resolver from configuration - nameserver list, port and
    /// timeout all come from the [ConfigFile].
    pub async fn from_config(config: &ConfigFile) -> Result<Self, GoatHerdError> {
        let target = config.nameserver_address()?;
        debug!("resolver using nameserver {target}");
        let client = DnsClient::connect_with_options(
            target,
            ClientOptions {
                timeout: config.query_timeout(),
                capture_packets: config.capture_packets,
            },
        )
        .await?;
        Ok(Resolver { client })
    }

    async fn lookup(&self, host: &str, qtype: RecordType) -> Result<Message, GoatHerdError> {
        let qname = DnsName::try_from(host)?;
        self.client.query(Message::query(qname, qtype)).await
    }

    /// A records for a host, returned as socket addresses on the port you
    /// plan to talk to.
    pub async fn lookup_a(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, GoatHerdError> {
        let response = self.lookup(host, RecordType::A).await?;
        Ok(response
            .answers
            .iter()
            .filter_map(|record| match &record.rdata {
                RecordData::A { address } => {
                    Some(SocketAddr::V4(SocketAddrV4::new(*address, port)))
                }
                _ => None,
            })
            .collect())
    }

    /// AAAA records for a host, same deal as [Resolver::lookup_a].
    pub async fn lookup_aaaa(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<SocketAddr>, GoatHerdError> {
        let response = self.lookup(host, RecordType::AAAA).await?;
        Ok(response
            .answers
            .iter()
            .filter_map(|record| match &record.rdata {
                RecordData::AAAA { address } => {
                    Some(SocketAddr::V6(SocketAddrV6::new(*address, port, 0, 0)))
                }
                _ => None,
            })
            .collect())
    }

    pub async fn lookup_srv(&self, host: &str) -> Result<Vec<SrvLookup>, GoatHerdError> {
        let response = self.lookup(host, RecordType::SRV).await?;
        Ok(response
            .answers
            .iter()
            .filter_map(|record| match &record.rdata {
                RecordData::SRV {
                    priority,
                    weight,
                    port,
                    target,
                } => Some(SrvLookup {
                    priority: *priority,
                    weight: *weight,
                    port: *port,
                    target: target.clone(),
                }),
                _ => None,
            })
            .collect())
    }

    pub async fn lookup_txt(&self, host: &str) -> Result<Vec<TxtLookup>, GoatHerdError> {
        let response = self.lookup(host, RecordType::TXT).await?;
        Ok(response
            .answers
            .iter()
            .filter_map(|record| match &record.rdata {
                RecordData::TXT {
                    txtdata,
                    key,
                    value,
                } => Some(TxtLookup {
                    text: txtdata.to_string(),
                    key: key.clone(),
                    value: value.clone(),
                }),
                _ => None,
            })
            .collect())
    }

    pub async fn lookup_ptr(&self, host: &str) -> Result<Vec<DnsName>, GoatHerdError> {
        let response = self.lookup(host, RecordType::PTR).await?;
        Ok(response
            .answers
            .iter()
            .filter_map(|record| match &record.rdata {
                RecordData::PTR { ptrdname } => Some(ptrdname.clone()),
                _ => None,
            })
            .collect())
    }

    /// The underlying client, for anything the typed helpers don't cover.
    pub fn client(&self) -> &DnsClient {
        &self.client
    }
}
