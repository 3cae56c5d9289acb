//! Junos configuration directive generation.
//!
//! One directive is one native `set` statement. The text here must match
//! the device's configuration-statement syntax byte-for-byte: in
//! simulated mode the staged list is shown to the caller as authoritative
//! evidence of what would have been sent.

use crate::request::ConfigurationRequest;

/// Description attached to interfaces configured by this tool.
const INTERFACE_DESCRIPTION: &str = "Automated configuration";

/// Zone on the far side of the generated traffic policies.
const UNTRUST_ZONE: &str = "untrust";

/// Name of the generated HTTP policy.
const HTTP_POLICY: &str = "allow-http";

/// Junos application matched by the HTTP policy.
const HTTP_APPLICATION: &str = "junos-http";

/// Interface directives: address assignment plus description.
pub fn interface_directives(interface: &str, address: &str) -> Vec<String> {
    vec![
        format!(
            "set interfaces {} unit 0 family inet address {}",
            interface, address
        ),
        format!(
            "set interfaces {} unit 0 description '{}'",
            interface, INTERFACE_DESCRIPTION
        ),
    ]
}

/// Zone-membership directive for logical unit 0 of the interface.
pub fn zone_directive(zone: &str, interface: &str) -> String {
    format!(
        "set security zones security-zone {} interfaces {}.0",
        zone, interface
    )
}

/// Policy directives permitting HTTP from the interface's zone to the
/// untrust zone. The policy name is derived deterministically from the
/// zone pair.
pub fn policy_directives(from_zone: &str) -> Vec<String> {
    policy(from_zone, UNTRUST_ZONE, HTTP_POLICY, HTTP_APPLICATION)
}

fn policy(from_zone: &str, to_zone: &str, name: &str, application: &str) -> Vec<String> {
    let prefix = format!(
        "set security policies from-zone {} to-zone {} policy {}",
        from_zone, to_zone, name
    );
    vec![
        format!("{} match source-address any", prefix),
        format!("{} match destination-address any", prefix),
        format!("{} match application {}", prefix, application),
        format!("{} then permit", prefix),
    ]
}

/// The full canonical directive sequence for a request, in apply order.
pub fn configuration_directives(request: &ConfigurationRequest) -> Vec<String> {
    let mut directives = interface_directives(&request.interface, &request.address);
    directives.push(zone_directive(&request.zone, &request.interface));
    directives.extend(policy_directives(&request.zone));
    directives
}
