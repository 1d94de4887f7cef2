//! Code related to CLI things
//!

use std::net::IpAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::client::{CallbackSignal, ClientOptions, QueryCallback};
use crate::config::ConfigFile;
use crate::enums::{RecordClass, RecordType};
use crate::error::GoatHerdError;
use crate::message::{Envelope, Message, Question, ResourceRecord};
use crate::multicast::{mdns_client, MdnsHandler, MdnsInterface, MulticastOptions, Responders};
use crate::name::DnsName;
use crate::rdata::RecordData;
use crate::resolver::Resolver;

#[derive(Parser, Clone)]
pub struct SharedOpts {
    #[clap(short, long, help = "Configuration file")]
    pub config: Option<String>,
    #[clap(short, long)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a nameserver something
    Query {
        #[clap(flatten)]
        sopt: SharedOpts,
        /// The name to look up
        name: String,
        #[clap(short, long, default_value = "A", help = "Record type: A, AAAA, SRV, TXT, PTR")]
        rrtype: String,
        #[clap(short, long, help = "Nameserver to use, overrides the config")]
        nameserver: Option<IpAddr>,
    },
    /// Ask the local network instead
    MdnsQuery {
        #[clap(flatten)]
        sopt: SharedOpts,
        /// The name to look up, eg _workstation._tcp.local
        name: String,
        #[clap(short, long, default_value = "PTR")]
        rrtype: String,
        #[clap(short, long, default_value_t = 3, help = "How long to collect answers for")]
        wait_seconds: u64,
    },
    /// Advertise a service on the local network until ctrl-c
    Respond {
        #[clap(flatten)]
        sopt: SharedOpts,
        /// Service type to answer for, eg _goat._tcp.local
        service: String,
        /// Port the advertised service listens on
        #[clap(short, long)]
        port: u16,
        #[clap(short, long, help = "Instance name, defaults to the hostname")]
        instance: Option<String>,
    },
    ConfigCheck {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
    ExportConfig {},
}

#[derive(Parser)]
#[command(arg_required_else_help(true))]
/// DNS and mDNS queries and service advertisement. But with goat references.
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn sopt(&self) -> Option<&SharedOpts> {
        match &self.command {
            Commands::Query { sopt, .. } => Some(sopt),
            Commands::MdnsQuery { sopt, .. } => Some(sopt),
            Commands::Respond { sopt, .. } => Some(sopt),
            Commands::ConfigCheck { sopt } => Some(sopt),
            Commands::ExportConfig {} => None,
        }
    }
}

/// Output a default configuration file, based on the [crate::config::ConfigFile] object.
pub fn default_config() {
    match ConfigFile::default().as_json_pretty() {
        Ok(output) => println!("{output}"),
        Err(_) => {
            error!("I don't know how, but we couldn't serialize our own config file default.")
        }
    };
}

/// Run a typed unicast query and print whatever comes back.
pub async fn run_query(
    config: &ConfigFile,
    name: &str,
    rrtype: &str,
    nameserver: Option<IpAddr>,
) -> Result<(), GoatHerdError> {
    let mut config = config.clone();
    if let Some(addr) = nameserver {
        config.nameservers = vec![addr];
    }
    let resolver = Resolver::from_config(&config).await?;

    let rrtype = RecordType::from(rrtype);
    match rrtype {
        RecordType::A => {
            for addr in resolver.lookup_a(name, 0).await? {
                println!("{}", addr.ip());
            }
        }
        RecordType::AAAA => {
            for addr in resolver.lookup_aaaa(name, 0).await? {
                println!("{}", addr.ip());
            }
        }
        RecordType::SRV => {
            for srv in resolver.lookup_srv(name).await? {
                println!(
                    "priority={} weight={} port={} target={}",
                    srv.priority, srv.weight, srv.port, srv.target
                );
            }
        }
        RecordType::TXT => {
            for txt in resolver.lookup_txt(name).await? {
                match txt.key.is_empty() {
                    true => println!("{:?}", txt.text),
                    false => println!("{}={}", txt.key, txt.value),
                }
            }
        }
        RecordType::PTR => {
            for target in resolver.lookup_ptr(name).await? {
                println!("{target}");
            }
        }
        _ => {
            return Err(GoatHerdError::Unsupported(format!(
                "can't do typed queries for {rrtype:?}"
            )))
        }
    };
    Ok(())
}

/// Fire one mDNS query at the group and print answers as the herd replies.
pub async fn run_mdns_query(
    config: &ConfigFile,
    name: &str,
    rrtype: &str,
    wait_seconds: u64,
) -> Result<(), GoatHerdError> {
    let rrtype = RecordType::from(rrtype);
    if rrtype == RecordType::InvalidType {
        return Err(GoatHerdError::Unsupported(format!(
            "unknown record type {rrtype:?}"
        )));
    }

    let client = mdns_client(
        MdnsInterface::V4(std::net::Ipv4Addr::UNSPECIFIED),
        &MulticastOptions {
            ignore_self: config.ignore_self,
            capture_packets: config.capture_packets,
            port: config.mdns_port,
        },
        ClientOptions {
            timeout: Duration::from_secs(wait_seconds),
            capture_packets: config.capture_packets,
        },
    )?;

    // keep the entry alive for the whole window, answers come from anywhere
    let callback: QueryCallback = Box::new(|message: &Message| {
        let message = message.clone();
        async move {
            for answer in &message.answers {
                println!("{} {:?}", answer.name, answer.rdata);
            }
            CallbackSignal::Continue
        }
        .boxed()
    });

    let qname = DnsName::try_from(name)?;
    let handle = client
        .send_query(
            Message::query(qname, rrtype),
            callback,
            Duration::from_secs(wait_seconds),
        )
        .await?;

    // the handle fails with Timeout when the window closes, that's the happy path here
    match handle.reply().await {
        Ok(_) => {}
        Err(GoatHerdError::Timeout) => debug!("collection window closed"),
        Err(error) => return Err(error),
    };
    Ok(())
}

/// Answers PTR questions for one advertised service instance.
pub struct ServiceAdvertiser {
    service: DnsName,
    instance: DnsName,
    hostname: DnsName,
    port: u16,
}

impl ServiceAdvertiser {
    pub fn new(service: &str, instance: &str, port: u16) -> Result<Self, GoatHerdError> {
        let service_name = DnsName::try_from(service)?;
        let mut instance_name = DnsName::try_from(instance)?;
        instance_name.labels.extend(service_name.labels.clone());

        let hostname = gethostname::gethostname();
        let mut hostname = DnsName::try_from(hostname.to_string_lossy().as_ref())
            .unwrap_or_else(|_| DnsName {
                labels: vec![b"goatherd".to_vec()],
            });
        hostname.labels.push(b"local".to_vec());

        Ok(ServiceAdvertiser {
            service: service_name,
            instance: instance_name,
            hostname,
            port,
        })
    }

    fn wants(&self, question: &Question) -> bool {
        let type_matches =
            question.qtype == RecordType::PTR || question.qtype == RecordType::ANY;
        type_matches
            && question.qname.to_string().to_ascii_lowercase()
                == self.service.to_string().to_ascii_lowercase()
    }
}

#[async_trait::async_trait]
impl MdnsHandler for ServiceAdvertiser {
    async fn handle(&self, query: Envelope) -> Result<Option<Envelope>, GoatHerdError> {
        if !query.message.questions.iter().any(|q| self.wants(q)) {
            return Ok(None);
        }
        debug!("answering {} for {:?}", self.service, query.addr);

        let mut response = Message::response_to(&query.message);
        response.header.authoritative = true;
        response.answers.push(ResourceRecord::new(
            self.service.clone(),
            RecordType::PTR,
            RecordClass::Internet,
            120,
            RecordData::PTR {
                ptrdname: self.instance.clone(),
            },
        ));
        // SRV is unique to us, so it carries the cache-flush bit
        response.additionals.push(
            ResourceRecord::new(
                self.instance.clone(),
                RecordType::SRV,
                RecordClass::Internet,
                120,
                RecordData::SRV {
                    priority: 0,
                    weight: 0,
                    port: self.port,
                    target: self.hostname.clone(),
                },
            )
            .with_cache_flush(),
        );

        Ok(Some(Envelope {
            addr: query.addr,
            message: response,
        }))
    }
}

/// Stand up the responder fan-out and advertise until ctrl-c.
pub async fn run_responder(
    config: &ConfigFile,
    service: &str,
    port: u16,
    instance: Option<String>,
) -> Result<(), GoatHerdError> {
    let instance = match instance {
        Some(value) => value,
        None => gethostname::gethostname().to_string_lossy().to_string(),
    };
    let advertiser = ServiceAdvertiser::new(service, &instance, port)?;
    info!("advertising {instance}.{service} on port {port}");

    let mut responders = Responders::spawn(
        &config.responder_interfaces(),
        advertiser,
        MulticastOptions {
            ignore_self: config.ignore_self,
            capture_packets: config.capture_packets,
            port: config.mdns_port,
        },
    )?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    responders.shutdown();
    responders.join_all().await;
    Ok(())
}
