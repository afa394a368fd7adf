//! Shape checks the local provider applies before materializing a resource

use declarative::{Attributes, ResourceKind};
use regex::Regex;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

static K8S_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^1\.\d{1,2}$").unwrap_or_else(|e| panic!("invalid version pattern: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing attribute `{0}`")]
    Missing(&'static str),
    #[error("attribute `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        name,
        reason: reason.into(),
    }
}

fn required<'a>(attrs: &'a Attributes, name: &'static str) -> Result<&'a Value, ValidationError> {
    attrs.get(name).ok_or(ValidationError::Missing(name))
}

fn required_str<'a>(attrs: &'a Attributes, name: &'static str) -> Result<&'a str, ValidationError> {
    match required(attrs, name)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::String(_) => Err(invalid(name, "must not be empty")),
        _ => Err(invalid(name, "must be a string")),
    }
}

fn optional_u64(attrs: &Attributes, name: &'static str) -> Result<Option<u64>, ValidationError> {
    match attrs.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(name, "must be a non-negative integer")),
    }
}

/// Check an IPv4 CIDR block usable for a VPC (/16 to /28)
pub fn check_cidr(cidr: &str) -> Result<(), String> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("`{cidr}` is not in ADDRESS/PREFIX form"))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| format!("`{addr}` is not an IPv4 address"))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| format!("`{prefix}` is not a prefix length"))?;
    if !(16..=28).contains(&prefix) {
        return Err(format!("prefix /{prefix} is outside /16../28"));
    }
    let host_bits = u32::from(addr) & (u32::MAX >> prefix);
    if host_bits != 0 {
        return Err(format!("`{cidr}` has host bits set"));
    }
    Ok(())
}

/// Validate attributes for a resource kind
pub fn validate(kind: ResourceKind, attrs: &Attributes) -> Result<(), ValidationError> {
    match kind {
        ResourceKind::Network => {
            check_cidr(required_str(attrs, "cidr")?).map_err(|e| invalid("cidr", e))?;
            let azs = optional_u64(attrs, "max_azs")?.unwrap_or(1);
            if azs == 0 {
                return Err(invalid("max_azs", "must be at least 1"));
            }
            if let Some(nat) = optional_u64(attrs, "nat_gateways")?
                && nat > azs
            {
                return Err(invalid(
                    "nat_gateways",
                    format!("{nat} gateways for {azs} availability zones"),
                ));
            }
        }
        ResourceKind::Endpoint => {
            required_str(attrs, "vpc")?;
            required_str(attrs, "service")?;
            if let Some(port) = optional_u64(attrs, "port")?
                && !(1..=65535).contains(&port)
            {
                return Err(invalid("port", format!("{port} is not a valid port")));
            }
        }
        ResourceKind::Role => {
            required_str(attrs, "assumed_by")?;
            let policies = required(attrs, "managed_policies")?
                .as_array()
                .ok_or_else(|| invalid("managed_policies", "must be a list"))?;
            if policies.is_empty() {
                return Err(invalid("managed_policies", "must not be empty"));
            }
            if policies
                .iter()
                .any(|p| p.as_str().is_none_or(|s| s.trim().is_empty()))
            {
                return Err(invalid("managed_policies", "entries must be policy names"));
            }
        }
        ResourceKind::Cluster => {
            required_str(attrs, "vpc")?;
            required_str(attrs, "role_arn")?;
            let version = required_str(attrs, "version")?;
            if !K8S_VERSION.is_match(version) {
                return Err(invalid("version", format!("`{version}` is not a 1.x version")));
            }
            optional_u64(attrs, "default_capacity")?;
        }
        ResourceKind::NodeGroup => {
            required_str(attrs, "cluster")?;
            required_str(attrs, "node_role")?;
            let min = optional_u64(attrs, "min_size")?.unwrap_or(1);
            let max = optional_u64(attrs, "max_size")?.unwrap_or(min.max(1));
            if max == 0 {
                return Err(invalid("max_size", "must be at least 1"));
            }
            if min > max {
                return Err(invalid("min_size", format!("{min} is above max_size {max}")));
            }
        }
        ResourceKind::Addon => {
            required_str(attrs, "cluster")?;
            required_str(attrs, "addon")?;
        }
    }
    Ok(())
}
