use std::net::IpAddr;

use crate::error::ProbeError;
use crate::{Family, Target};

/// Resolved destination of a probe session
///
/// Immutable once the session starts. The host name is kept for display only, all traffic goes to
/// `addr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub addr: IpAddr,
}

impl Destination {
    /// Resolve the user's target to a single address
    ///
    /// Host names go through a DNS lookup and the first address of the requested family wins, or
    /// the first address of any family if none was requested. IP literals are used as they are and
    /// only get a best-effort reverse lookup for display.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Resolution` if the lookup fails and `ProbeError::NoAddress` if no
    /// address of the requested family exists.
    pub fn resolve(target: &Target, family: Option<Family>) -> Result<Self, ProbeError> {
        // These functions are not used anywhere else in the application
        use dns_lookup::{lookup_addr, lookup_host};

        match target {
            Target::Ip(addr) => {
                let addr = pick(&[*addr], family).ok_or_else(|| ProbeError::NoAddress {
                    host: addr.to_string(),
                    family: family.unwrap_or_else(|| Family::of(addr)),
                })?;
                let host = match lookup_addr(&addr) {
                    Ok(host) => host,
                    Err(e) => {
                        debug!("No reverse lookup for {}: {}", addr, e);
                        addr.to_string()
                    }
                };

                info!("Resolved IP {} to host {}", addr, host);

                Ok(Self { host, addr })
            }
            Target::Host(host) => {
                let addrs = lookup_host(host).map_err(|source| ProbeError::Resolution {
                    host: host.clone(),
                    source,
                })?;
                let addr = pick(&addrs, family).ok_or_else(|| ProbeError::NoAddress {
                    host: host.clone(),
                    family: family.unwrap_or(Family::V4),
                })?;

                info!("Resolved host {} to IP {}", host, addr);

                Ok(Self {
                    host: host.clone(),
                    addr,
                })
            }
        }
    }

    pub fn family(&self) -> Family {
        Family::of(&self.addr)
    }
}

/// First address matching `family`, or the first address at all
fn pick(addrs: &[IpAddr], family: Option<Family>) -> Option<IpAddr> {
    addrs
        .iter()
        .copied()
        .find(|addr| family.map_or(true, |family| Family::of(addr) == family))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> Vec<IpAddr> {
        vec![
            "2001:db8::1".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        ]
    }

    #[test]
    fn pick_first_of_family() {
        assert_eq!(
            pick(&addrs(), Some(Family::V4)),
            Some("192.0.2.1".parse().unwrap())
        );
        assert_eq!(
            pick(&addrs(), Some(Family::V6)),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(pick(&addrs(), None), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(pick(&[], None), None);
    }

    #[test]
    fn ip_literal_keeps_address() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        let dest = Destination::resolve(&Target::Ip(addr), None).expect("Failed resolving");
        assert_eq!(dest.addr, addr);
        assert_eq!(dest.family(), Family::V4);
        assert!(!dest.host.is_empty());
    }

    #[test]
    fn ip_literal_of_wrong_family() {
        let addr: IpAddr = "::1".parse().unwrap();
        match Destination::resolve(&Target::Ip(addr), Some(Family::V4)) {
            Err(ProbeError::NoAddress { family, .. }) => assert_eq!(family, Family::V4),
            other => panic!("expected NoAddress, got {:?}", other),
        }
    }

    #[test]
    fn unresolvable_host() {
        let target = Target::Host("does-not-exist.invalid".to_string());
        assert!(matches!(
            Destination::resolve(&target, None),
            Err(ProbeError::Resolution { .. }) | Err(ProbeError::NoAddress { .. })
        ));
    }
}
