//! Pinned DNS-over-TLS providers.

use std::net::SocketAddr;

/// A DNS-over-TLS endpoint: pinned SNI plus a primary and an optional
/// secondary address, both speaking DoT on 853.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotProvider {
    pub sni: String,
    pub primary: SocketAddr,
    pub secondary: Option<SocketAddr>,
}

impl DotProvider {
    /// A user-supplied provider triple.
    pub fn custom(sni: impl Into<String>, primary: SocketAddr, secondary: Option<SocketAddr>) -> Self {
        Self {
            sni: sni.into(),
            primary,
            secondary,
        }
    }

    pub(crate) fn addresses(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        std::iter::once(self.primary).chain(self.secondary)
    }
}

macro_rules! provider {
    ($fn_name:ident, $sni:literal, $primary:literal, $secondary:literal) => {
        pub fn $fn_name() -> DotProvider {
            DotProvider {
                sni: $sni.to_string(),
                primary: $primary.parse().expect("static provider address"),
                secondary: Some($secondary.parse().expect("static provider address")),
            }
        }
    };
    ($fn_name:ident, $sni:literal, $primary:literal) => {
        pub fn $fn_name() -> DotProvider {
            DotProvider {
                sni: $sni.to_string(),
                primary: $primary.parse().expect("static provider address"),
                secondary: None,
            }
        }
    };
}

provider!(google, "dns.google", "8.8.8.8:853", "8.8.4.4:853");
provider!(cloudflare, "cloudflare-dns.com", "1.1.1.1:853", "1.0.0.1:853");
provider!(quad9, "dns.quad9.net", "9.9.9.9:853", "149.112.112.112:853");
provider!(adguard, "dns.adguard-dns.com", "94.140.14.14:853", "94.140.15.15:853");
provider!(
    cira_shield,
    "private.canadianshield.cira.ca",
    "149.112.121.10:853",
    "149.112.122.10:853"
);
provider!(alidns, "dns.alidns.com", "223.5.5.5:853", "223.6.6.6:853");
provider!(quad101, "101.101.101.101", "101.101.101.101:853", "101.102.103.104:853");
provider!(sb, "dns.sb", "185.222.222.222:853", "45.11.45.11:853");
provider!(forge, "dnsforge.de", "176.9.93.198:853", "176.9.1.117:853");
provider!(libre, "dot.libredns.gr", "116.202.176.26:853");
provider!(switch, "dns.switch.ch", "130.59.31.248:853", "130.59.31.251:853");

#[cfg(test)]
mod tests {
    #[test]
    fn providers_parse() {
        for provider in [
            super::google(),
            super::cloudflare(),
            super::quad9(),
            super::adguard(),
            super::cira_shield(),
            super::alidns(),
            super::quad101(),
            super::sb(),
            super::forge(),
            super::libre(),
            super::switch(),
        ] {
            assert_eq!(provider.primary.port(), 853);
            assert!(!provider.sni.is_empty());
        }
    }
}
