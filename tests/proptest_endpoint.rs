//! Property-based tests for endpoint normalization and classification.
//!
//! These tests verify:
//! - Normalizing a normalized URL is a no-op
//! - Onion hosts always resolve to `tcp`, whatever the case or scheme
//! - Private IPv4 ranges classify as local
//! - Preset rotation visits every preset once per cycle
//! - Sanitized messages never contain the host

use std::sync::Arc;

use noderoute_core::endpoint::{detect_kind, normalize, EndpointKind, EndpointScheme};
use noderoute_core::node::{
    BitcoinNetwork, EndpointProvider, InMemoryNodeConfigRepository, PublicNode,
};
use noderoute_core::sanitize::sanitize_message;
use noderoute_core::TransportPolicy;
use proptest::prelude::*;

fn hostname_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}(\\.[a-z][a-z0-9]{1,10}){1,2}"
}

fn scheme_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(""),
        Just("ssl://"),
        Just("tcp://"),
        Just("SSL://"),
        Just("Tcp://"),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the canonical URL of an endpoint normalizes to itself.
    #[test]
    fn normalize_is_idempotent(
        scheme in scheme_strategy(),
        host in hostname_strategy(),
        port in proptest::option::of(1u16..=65535),
    ) {
        let raw = match port {
            Some(port) => format!("{scheme}{host}:{port}"),
            None => format!("{scheme}{host}"),
        };
        let first = normalize(&raw, EndpointScheme::Ssl).expect("valid host must normalize");
        let second = normalize(&first.url(), EndpointScheme::Ssl).expect("canonical URL must normalize");
        prop_assert_eq!(first, second);
    }

    /// Property: onion hosts are forced to `tcp` regardless of the scheme
    /// or the case of the suffix.
    #[test]
    fn onion_hosts_always_use_tcp(
        scheme in scheme_strategy(),
        label in "[a-zA-Z2-7]{16,56}",
        suffix in prop_oneof![Just(".onion"), Just(".ONION"), Just(".Onion")],
        port in 1u16..=65535,
    ) {
        let raw = format!("{scheme}{label}{suffix}:{port}");
        let endpoint = normalize(&raw, EndpointScheme::Ssl).expect("onion must normalize");
        prop_assert_eq!(endpoint.kind(), EndpointKind::Onion);
        prop_assert_eq!(endpoint.scheme(), EndpointScheme::Tcp);
        prop_assert!(endpoint.url().starts_with("tcp://"));
    }

    /// Property: every address in the RFC 1918 and loopback ranges is local.
    #[test]
    fn private_ipv4_is_local(
        range in 0usize..4,
        b in 0u8..=255,
        c in 0u8..=255,
        d in 0u8..=255,
    ) {
        let host = match range {
            0 => format!("10.{b}.{c}.{d}"),
            1 => format!("127.{b}.{c}.{d}"),
            2 => format!("172.{}.{c}.{d}", 16 + b % 16),
            _ => format!("192.168.{c}.{d}"),
        };
        prop_assert_eq!(detect_kind(&host), EndpointKind::Local);
    }

    /// Property: rotating `n` times through an `n`-preset ring visits each
    /// preset once and returns to the start.
    #[test]
    fn rotation_cycles_through_ring(size in 2usize..8, start in 0usize..8) {
        let start = start % size;
        let presets: Vec<PublicNode> = (0..size)
            .map(|i| PublicNode::new(
                format!("p{i}"),
                format!("Preset {i}"),
                format!("ssl://p{i}.example:50002"),
                BitcoinNetwork::Signet,
            ))
            .collect();
        let provider = EndpointProvider::new(
            Arc::new(InMemoryNodeConfigRepository::default()),
            TransportPolicy::AllRemote,
        )
        .with_presets(presets);

        let mut current = format!("p{start}");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..size {
            current = provider
                .rotate_to_next_preset(BitcoinNetwork::Signet, &current)
                .expect("ring has alternatives");
            seen.insert(current.clone());
        }
        prop_assert_eq!(current, format!("p{start}"));
        prop_assert_eq!(seen.len(), size);
    }

    /// Property: a sanitized error message never contains the host, in any
    /// case.
    #[test]
    fn sanitized_message_hides_host(host in hostname_strategy(), upper in any::<bool>()) {
        let shown = if upper { host.to_uppercase() } else { host.clone() };
        let message = format!("connect to {shown} failed: connection refused");
        let sanitized = sanitize_message(&message, Some(&host)).to_lowercase();
        prop_assert!(!sanitized.contains(&host));
    }
}
