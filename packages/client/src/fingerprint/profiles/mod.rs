//! Built-in impersonation profiles. Each profile carries the TLS, HTTP/2 and
//! HTTP/3 halves of a named browser build atomically.

mod chrome;
mod firefox;
mod tor;

use super::Fingerprint;

/// The Chrome desktop profile.
pub fn chrome() -> Fingerprint {
    chrome::fingerprint()
}

/// The Firefox desktop profile.
pub fn firefox() -> Fingerprint {
    firefox::fingerprint()
}

/// The Tor Browser profile. HTTP/3 is disabled for this profile.
pub fn tor() -> Fingerprint {
    tor::fingerprint()
}

#[cfg(test)]
mod tests {
    use crate::fingerprint::ProfileId;

    #[test]
    fn profiles_disagree_on_ja3() {
        let chrome = super::chrome();
        let firefox = super::firefox();
        assert_ne!(chrome.hello.ja3_hash(), firefox.hello.ja3_hash());
        assert_eq!(chrome.id, ProfileId::Chrome(131));
    }

    #[test]
    fn tor_tracks_firefox_tls() {
        assert_eq!(
            super::tor().hello.ja3_hash(),
            super::firefox().hello.ja3_hash()
        );
    }

    #[test]
    fn chrome_akamai_reference() {
        assert_eq!(
            super::chrome().h2.akamai_fingerprint(),
            "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p"
        );
    }
}
