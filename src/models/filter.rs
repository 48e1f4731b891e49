use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::utils::error::{AppError, AppResult};

/// Transport protocols a capture can be narrowed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which end of a conversation a host or port constraint applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideFilter<T> {
    Source(T),
    Destination(T),
    Either(T),
}

impl<T: PartialEq> SideFilter<T> {
    pub fn matches(&self, source: &T, destination: &T) -> bool {
        match self {
            SideFilter::Source(value) => value == source,
            SideFilter::Destination(value) => value == destination,
            SideFilter::Either(value) => value == source || value == destination,
        }
    }
}

impl<T: fmt::Display> fmt::Display for SideFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideFilter::Source(value) => write!(f, "src {}", value),
            SideFilter::Destination(value) => write!(f, "dst {}", value),
            SideFilter::Either(value) => write!(f, "{}", value),
        }
    }
}

pub type HostFilter = SideFilter<IpAddr>;
pub type PortFilter = SideFilter<u16>;

/// Raw query parameters of a capture request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    /// Interface to capture on
    #[serde(rename = "i")]
    pub interface: Option<String>,

    /// `true` to keep only TCP
    pub tcp: Option<String>,

    /// `true` to keep only UDP
    pub udp: Option<String>,

    #[serde(rename = "h")]
    pub host: Option<String>,

    #[serde(rename = "h.src")]
    pub host_src: Option<String>,

    #[serde(rename = "h.dst")]
    pub host_dst: Option<String>,

    #[serde(rename = "p")]
    pub port: Option<String>,

    #[serde(rename = "p.src")]
    pub port_src: Option<String>,

    #[serde(rename = "p.dst")]
    pub port_dst: Option<String>,
}

/// Immutable filter for one capture session. Absent fields place no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub interface: String,
    pub protocol: Option<Protocol>,
    pub host: Option<HostFilter>,
    pub port: Option<PortFilter>,
}

impl FilterSpec {
    /// Filter with no constraints besides the interface
    #[cfg(test)]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            protocol: None,
            host: None,
            port: None,
        }
    }

    #[cfg(test)]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    #[cfg(test)]
    pub fn with_host(mut self, host: HostFilter) -> Self {
        self.host = Some(host);
        self
    }

    #[cfg(test)]
    pub fn with_port(mut self, port: PortFilter) -> Self {
        self.port = Some(port);
        self
    }

    /// Validate request parameters into a filter
    pub fn from_params(params: FilterParams) -> AppResult<Self> {
        let interface =
            non_empty(params.interface).ok_or_else(|| AppError::validation("interface required"))?;

        let protocol = match (is_true(&params.tcp), is_true(&params.udp)) {
            (true, true) => {
                return Err(AppError::validation(
                    "tcp and udp filters cannot be combined",
                ))
            }
            (true, false) => Some(Protocol::Tcp),
            (false, true) => Some(Protocol::Udp),
            (false, false) => None,
        };

        let host = pick_side(
            "host",
            params.host_src,
            params.host_dst,
            params.host,
            parse_host,
        )?;
        let port = pick_side(
            "port",
            params.port_src,
            params.port_dst,
            params.port,
            parse_port,
        )?;

        Ok(Self {
            interface,
            protocol,
            host,
            port,
        })
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interface {}", self.interface)?;
        if let Some(protocol) = &self.protocol {
            write!(f, ", proto {}", protocol)?;
        }
        if let Some(host) = &self.host {
            write!(f, ", host {}", host)?;
        }
        if let Some(port) = &self.port {
            write!(f, ", port {}", port)?;
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_true(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim) == Some("true")
}

fn pick_side<T>(
    dimension: &str,
    source: Option<String>,
    destination: Option<String>,
    either: Option<String>,
    parse: fn(&str) -> AppResult<T>,
) -> AppResult<Option<SideFilter<T>>> {
    match (non_empty(source), non_empty(destination), non_empty(either)) {
        (None, None, None) => Ok(None),
        (Some(value), None, None) => Ok(Some(SideFilter::Source(parse(&value)?))),
        (None, Some(value), None) => Ok(Some(SideFilter::Destination(parse(&value)?))),
        (None, None, Some(value)) => Ok(Some(SideFilter::Either(parse(&value)?))),
        _ => Err(AppError::Validation(format!(
            "only one {} filter may be set",
            dimension
        ))),
    }
}

fn parse_host(value: &str) -> AppResult<IpAddr> {
    value
        .parse()
        .map_err(|_| AppError::Validation(format!("invalid host address '{}'", value)))
}

fn parse_port(value: &str) -> AppResult<u16> {
    match value.parse::<u16>() {
        Ok(0) => Err(AppError::validation("port must be a positive number")),
        Ok(port) => Ok(port),
        Err(_) => Err(AppError::Validation(format!("invalid port '{}'", value))),
    }
}
