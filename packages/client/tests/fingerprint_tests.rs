//! Fingerprint identity properties: byte-stable ClientHello encodings,
//! JA3 digests and the Akamai HTTP/2 text.

use guise_client::fingerprint::{ja3, profiles};

#[test]
fn client_hello_bytes_are_invariant_across_invocations() {
    let spec = profiles::chrome().hello;
    let first = spec.encode("example.com");
    let second = spec.encode("example.com");
    assert_eq!(first, second);
}

#[test]
fn client_hello_bytes_do_not_depend_on_client_options() {
    // The encoding is a pure function of the spec: two clients differing in
    // DNS and proxy configuration still present identical hellos.
    let via_defaults = profiles::chrome().hello.encode("target.example");
    let spec_again = profiles::chrome().hello;
    let via_other_config = spec_again.encode("target.example");
    assert_eq!(via_defaults, via_other_config);
}

#[test]
fn ja3_hash_is_stable_per_profile() {
    let chrome_a = profiles::chrome().hello.ja3_hash();
    let chrome_b = profiles::chrome().hello.ja3_hash();
    assert_eq!(chrome_a, chrome_b);
    assert_eq!(chrome_a.len(), 32);
    assert!(chrome_a.bytes().all(|b| b.is_ascii_hexdigit()));

    assert_ne!(chrome_a, profiles::firefox().hello.ja3_hash());
}

#[test]
fn ja3_parse_then_render_round_trips() {
    let text =
        "771,4865-4866-4867-49195-49199,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-21,29-23-24,0";
    let spec = ja3::parse(text).unwrap();
    assert_eq!(spec.ja3(), text);
}

#[test]
fn akamai_fingerprints_match_references() {
    assert_eq!(
        profiles::chrome().h2.akamai_fingerprint(),
        "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p"
    );
    assert_eq!(
        profiles::firefox().h2.akamai_fingerprint(),
        "1:65536;4:131072;5:16384|12517377|3:0:0:201,5:0:0:101,7:0:0:1,9:0:7:1,11:0:3:1,13:0:0:241|m,p,a,s"
    );
}

#[test]
fn sni_follows_the_target_host() {
    let spec = profiles::firefox().hello;
    let bytes = spec.encode("a.example.net");
    assert!(bytes
        .windows(b"a.example.net".len())
        .any(|w| w == b"a.example.net"));
    assert!(!bytes
        .windows(b"b.example.net".len())
        .any(|w| w == b"b.example.net"));
}

#[test]
fn quic_shape_is_part_of_the_profile() {
    let chrome = profiles::chrome().quic;
    assert_eq!(chrome.src_conn_id_length, 0);
    assert_eq!(chrome.dest_conn_id_length, 8);
    assert!(chrome.udp_datagram_min_size >= 1200);

    let firefox = profiles::firefox().quic;
    assert_ne!(
        chrome.cache_key_bytes(),
        firefox.cache_key_bytes(),
        "profiles must not share a transport-cache identity"
    );
}
