//! Address stack resolution
//!
//! A multiaddr accepted by the transport has the shape
//!
//! ```text
//! /<ip4|ip6|dns4|dns6|dns>/<host>/tcp/<port>[/ws | /wss][/p2p/<peer-id>]
//! ```
//!
//! Anything else is a negative match: addresses meant for other transports
//! are expected here and are rejected without an error.

use libp2p_identity::PeerId;
use multiaddr::{Multiaddr, Protocol};
use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Kind of host named by the first address component
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostFamily {
    Ip4,
    Ip6,
    Dns4,
    Dns6,
    Dns,
}

impl HostFamily {
    /// Whether the host must go through name resolution
    pub fn is_dns(self) -> bool {
        matches!(self, Self::Dns4 | Self::Dns6 | Self::Dns)
    }

    /// Whether a resolved IP address is acceptable for this family
    pub fn admits(self, ip: &IpAddr) -> bool {
        match self {
            Self::Ip4 | Self::Dns4 => ip.is_ipv4(),
            Self::Ip6 | Self::Dns6 => ip.is_ipv6(),
            Self::Dns => true,
        }
    }
}

impl fmt::Display for HostFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ip4 => "ip4",
            Self::Ip6 => "ip6",
            Self::Dns4 => "dns4",
            Self::Dns6 => "dns6",
            Self::Dns => "dns",
        })
    }
}

/// The layers a multiaddr asks for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressStack {
    /// Host kind
    pub host_family: HostFamily,
    /// Host as written in the address (numeric for IP families)
    pub host: String,
    /// TCP port
    pub port: u16,
    /// WebSocket framing over plain TCP
    pub ws: bool,
    /// WebSocket framing over TLS
    pub wss: bool,
}

impl AddressStack {
    /// Resolve the layer stack for `address`, or `None` if the address is
    /// not a TCP (optionally WS/WSS) address.
    pub fn resolve(address: &Multiaddr) -> Option<Self> {
        let mut components = address.iter();

        let (host_family, host) = match components.next()? {
            Protocol::Ip4(ip) => (HostFamily::Ip4, ip.to_string()),
            Protocol::Ip6(ip) => (HostFamily::Ip6, ip.to_string()),
            Protocol::Dns4(name) => (HostFamily::Dns4, name.into_owned()),
            Protocol::Dns6(name) => (HostFamily::Dns6, name.into_owned()),
            Protocol::Dns(name) => (HostFamily::Dns, name.into_owned()),
            _ => return None,
        };

        let Protocol::Tcp(port) = components.next()? else {
            return None;
        };

        let mut stack = Self {
            host_family,
            host,
            port,
            ws: false,
            wss: false,
        };

        let mut next = components.next();
        match next {
            Some(Protocol::Ws(_)) => {
                stack.ws = true;
                next = components.next();
            }
            Some(Protocol::Wss(_)) => {
                stack.wss = true;
                next = components.next();
            }
            _ => {}
        }

        match next {
            None => Some(stack),
            Some(Protocol::P2p(_)) if components.next().is_none() => Some(stack),
            Some(_) => None,
        }
    }

    /// Whether `address` resolves to a stack
    pub fn can_handle(address: &Multiaddr) -> bool {
        Self::resolve(address).is_some()
    }

    /// Whether the host needs name resolution
    pub fn is_dns(&self) -> bool {
        self.host_family.is_dns()
    }

    /// Whether any WebSocket framing is required
    pub fn is_framed(&self) -> bool {
        self.ws || self.wss
    }

    /// Literal endpoint for IP stacks; `None` for DNS stacks.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        if self.is_dns() {
            return None;
        }
        let ip: IpAddr = self.host.parse().ok()?;
        Some(SocketAddr::new(ip, self.port))
    }

    /// Canonical address for a concrete endpoint using this stack's layers.
    ///
    /// The IP family follows `endpoint`, so wildcard hosts and ephemeral
    /// ports come back as the values actually in use.
    pub fn to_address(&self, endpoint: SocketAddr) -> Multiaddr {
        let address = Multiaddr::from(endpoint.ip()).with(Protocol::Tcp(endpoint.port()));
        if self.ws {
            address.with(Protocol::Ws(Cow::Borrowed("/")))
        } else if self.wss {
            address.with(Protocol::Wss(Cow::Borrowed("/")))
        } else {
            address
        }
    }
}

/// Peer identity carried in a trailing `/p2p/<peer-id>` component
pub fn peer_id(address: &Multiaddr) -> Option<PeerId> {
    match address.iter().last()? {
        Protocol::P2p(peer) => Some(peer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_resolve_plain_tcp() {
        let stack = AddressStack::resolve(&addr("/ip4/127.0.0.1/tcp/40010")).unwrap();
        assert_eq!(stack.host_family, HostFamily::Ip4);
        assert_eq!(stack.host, "127.0.0.1");
        assert_eq!(stack.port, 40010);
        assert!(!stack.ws);
        assert!(!stack.wss);
        assert_eq!(stack.socket_addr(), Some("127.0.0.1:40010".parse().unwrap()));
    }

    #[test]
    fn test_resolve_ws_and_wss() {
        let ws = AddressStack::resolve(&addr("/ip4/127.0.0.1/tcp/40010/ws")).unwrap();
        assert!(ws.ws && !ws.wss);

        let wss = AddressStack::resolve(&addr("/dns4/example.com/tcp/443/wss")).unwrap();
        assert!(wss.wss && !wss.ws);
        assert_eq!(wss.host_family, HostFamily::Dns4);
        assert_eq!(wss.host, "example.com");
        assert_eq!(wss.socket_addr(), None);
    }

    #[test]
    fn test_resolve_host_families() {
        let cases = [
            ("/ip6/::1/tcp/1", HostFamily::Ip6),
            ("/dns4/a.example/tcp/1", HostFamily::Dns4),
            ("/dns6/a.example/tcp/1", HostFamily::Dns6),
            ("/dns/a.example/tcp/1", HostFamily::Dns),
        ];
        for (s, family) in cases {
            assert_eq!(AddressStack::resolve(&addr(s)).unwrap().host_family, family, "{s}");
        }
    }

    #[test]
    fn test_resolve_accepts_peer_suffix() {
        let peer = PeerId::random();
        let with_peer = addr(&format!("/ip4/10.0.0.1/tcp/4001/ws/p2p/{peer}"));
        let stack = AddressStack::resolve(&with_peer).unwrap();
        assert!(stack.ws);
        assert_eq!(peer_id(&with_peer), Some(peer));

        let plain = addr(&format!("/ip4/10.0.0.1/tcp/4001/p2p/{peer}"));
        assert!(AddressStack::can_handle(&plain));
    }

    #[test]
    fn test_resolve_rejects_other_shapes() {
        let peer = PeerId::random();
        let rejected = [
            "/ip4/127.0.0.1".to_string(),
            "/ip4/127.0.0.1/udp/40010".to_string(),
            "/ip4/127.0.0.1/tcp/40010/ws/wss".to_string(),
            "/ip4/127.0.0.1/tcp/40010/wss/ws".to_string(),
            "/tcp/40010/ip4/127.0.0.1".to_string(),
            "/ip4/127.0.0.1/tcp/40010/tcp/40011".to_string(),
            format!("/ip4/127.0.0.1/tcp/40010/p2p/{peer}/ws"),
            format!("/p2p/{peer}"),
        ];
        for s in &rejected {
            assert!(!AddressStack::can_handle(&addr(s)), "{s} should not resolve");
        }
        assert!(!AddressStack::can_handle(&Multiaddr::empty()));
    }

    #[test]
    fn test_non_numeric_port_fails_to_parse() {
        assert!("/ip4/127.0.0.1/tcp/http".parse::<Multiaddr>().is_err());
        assert!("/ip4/127.0.0.1/tcp/70000".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn test_to_address_is_canonical() {
        let stack = AddressStack::resolve(&addr("/ip4/0.0.0.0/tcp/0/ws")).unwrap();
        let bound = stack.to_address("127.0.0.1:51234".parse().unwrap());
        assert_eq!(bound.to_string(), "/ip4/127.0.0.1/tcp/51234/ws");

        let secure = AddressStack::resolve(&addr("/dns6/host.example/tcp/443/wss")).unwrap();
        let observed = secure.to_address("[::1]:443".parse().unwrap());
        assert_eq!(observed.to_string(), "/ip6/::1/tcp/443/wss");

        let plain = AddressStack::resolve(&addr("/ip4/1.2.3.4/tcp/5")).unwrap();
        assert_eq!(plain.to_address("1.2.3.4:5".parse().unwrap()).to_string(), "/ip4/1.2.3.4/tcp/5");
    }

    #[test]
    fn test_address_text_and_binary_roundtrip() {
        let original = addr("/dns4/example.com/tcp/443/wss");
        let text: Multiaddr = original.to_string().parse().unwrap();
        let binary = Multiaddr::try_from(original.to_vec()).unwrap();
        assert_eq!(text, original);
        assert_eq!(binary, original);
    }

    #[test]
    fn test_dns_family_admits() {
        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();
        assert!(HostFamily::Dns4.admits(&v4) && !HostFamily::Dns4.admits(&v6));
        assert!(HostFamily::Dns6.admits(&v6) && !HostFamily::Dns6.admits(&v4));
        assert!(HostFamily::Dns.admits(&v4) && HostFamily::Dns.admits(&v6));
    }
}
