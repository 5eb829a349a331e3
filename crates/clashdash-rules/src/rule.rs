//! Rule and action type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RulesError;

/// Modifier that tells the core not to resolve a domain before IP matching.
pub const NO_RESOLVE: &str = "no-resolve";

/// Stable local identity of a rule, independent of its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! match_types {
    ($($variant:ident => $tag:literal, $desc:literal, $example:literal;)*) => {
        /// Rule match type.
        ///
        /// Tags outside the known vocabulary are kept verbatim in
        /// [`MatchType::Other`] so they round-trip unchanged.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum MatchType {
            $($variant,)*
            Other(String),
        }

        impl MatchType {
            /// Every known match type, in presentation order.
            pub const KNOWN: &'static [MatchType] = &[$(MatchType::$variant,)*];

            /// The tag as written in rule files.
            pub fn as_str(&self) -> &str {
                match self {
                    $(MatchType::$variant => $tag,)*
                    MatchType::Other(tag) => tag,
                }
            }

            /// Short human-readable description.
            pub fn describe(&self) -> &'static str {
                match self {
                    $(MatchType::$variant => $desc,)*
                    MatchType::Other(_) => "unrecognised rule type",
                }
            }

            /// Example payload for this type, if known.
            pub fn example(&self) -> Option<&'static str> {
                match self {
                    $(MatchType::$variant => Some($example),)*
                    MatchType::Other(_) => None,
                }
            }
        }

        impl From<&str> for MatchType {
            fn from(tag: &str) -> Self {
                match tag {
                    $($tag => MatchType::$variant,)*
                    other => MatchType::Other(other.to_string()),
                }
            }
        }
    };
}

match_types! {
    Domain => "DOMAIN", "exact domain", "ad.com";
    DomainSuffix => "DOMAIN-SUFFIX", "domain suffix", "google.com";
    DomainKeyword => "DOMAIN-KEYWORD", "domain keyword", "google";
    DomainRegex => "DOMAIN-REGEX", "domain regular expression", "^abc.*com";
    Geosite => "GEOSITE", "predefined domain list", "youtube";
    IpCidr => "IP-CIDR", "destination IPv4 CIDR", "127.0.0.0/8";
    IpCidr6 => "IP-CIDR6", "destination IPv6 CIDR", "2620:0:2d0:200::7/32";
    IpSuffix => "IP-SUFFIX", "destination IP suffix", "8.8.8.8/24";
    IpAsn => "IP-ASN", "destination IP ASN", "13335";
    Geoip => "GEOIP", "destination GeoIP country", "CN";
    SrcGeoip => "SRC-GEOIP", "source GeoIP country", "cn";
    SrcIpAsn => "SRC-IP-ASN", "source IP ASN", "9808";
    SrcIpCidr => "SRC-IP-CIDR", "source IP CIDR", "192.168.1.201/32";
    SrcIpSuffix => "SRC-IP-SUFFIX", "source IP suffix", "192.168.1.201/8";
    DstPort => "DST-PORT", "destination port", "80";
    SrcPort => "SRC-PORT", "source port", "7777";
    InPort => "IN-PORT", "inbound port", "7890";
    InType => "IN-TYPE", "inbound type", "SOCKS/HTTP";
    InUser => "IN-USER", "inbound user", "mihomo";
    InName => "IN-NAME", "inbound name", "ss";
    ProcessPath => "PROCESS-PATH", "process path", "/usr/bin/wget";
    ProcessPathRegex => "PROCESS-PATH-REGEX", "process path regular expression", ".*bin/wget";
    ProcessName => "PROCESS-NAME", "process name", "curl";
    ProcessNameRegex => "PROCESS-NAME-REGEX", "process name regular expression", "(?i)Telegram";
    Uid => "UID", "user id", "1001";
    Network => "NETWORK", "network type", "udp";
    Dscp => "DSCP", "DSCP value", "4";
    RuleSet => "RULE-SET", "rule provider", "providername";
    And => "AND", "logical and", "((DOMAIN,baidu.com),(NETWORK,UDP))";
    Or => "OR", "logical or", "((NETWORK,UDP),(DOMAIN,baidu.com))";
    Not => "NOT", "logical not", "((DOMAIN,baidu.com))";
    SubRule => "SUB-RULE", "sub rule", "(NETWORK,tcp)";
}

impl MatchType {
    /// Destination-IP types, the only ones that accept `no-resolve`.
    pub fn is_ip_based(&self) -> bool {
        matches!(
            self,
            MatchType::IpCidr
                | MatchType::IpCidr6
                | MatchType::IpSuffix
                | MatchType::IpAsn
                | MatchType::Geoip
        )
    }

    /// Combinators whose payload nests other rules in parentheses.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            MatchType::And | MatchType::Or | MatchType::Not | MatchType::SubRule
        )
    }
}

impl From<String> for MatchType {
    fn from(tag: String) -> Self {
        MatchType::from(tag.as_str())
    }
}

impl From<MatchType> for String {
    fn from(ty: MatchType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing policy of a rule plus an optional modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Proxy-group name, or `DIRECT` / `REJECT`.
    pub policy: String,
    /// Trailing modifier such as `no-resolve`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
}

impl Action {
    pub fn new(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            modifier: None,
        }
    }

    /// Policy with the `no-resolve` modifier.
    pub fn no_resolve(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            modifier: Some(NO_RESOLVE.to_string()),
        }
    }

    pub fn is_no_resolve(&self) -> bool {
        self.modifier.as_deref() == Some(NO_RESOLVE)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.modifier {
            Some(modifier) => write!(f, "{},{}", self.policy, modifier),
            None => f.write_str(&self.policy),
        }
    }
}

/// Marks an entry that could not be fully decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFault {
    /// The original line, verbatim.
    pub raw: String,
    /// Why decoding failed.
    pub reason: String,
}

/// A single routing directive. Position is implied by sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub match_type: MatchType,
    pub target: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_fault: Option<ParseFault>,
    /// Store options this model does not interpret, written back unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Rule {
    /// Create an enabled rule with a fresh id.
    pub fn new(match_type: MatchType, target: impl Into<String>, action: Action) -> Self {
        Self {
            id: RuleId::new(),
            match_type,
            target: target.into(),
            action,
            comment: None,
            enabled: true,
            parse_fault: None,
            extra: BTreeMap::new(),
        }
    }

    /// Entry for a line that could not be decoded.
    pub fn faulted(raw: impl Into<String>, enabled: bool, reason: impl Into<String>) -> Self {
        Self {
            id: RuleId::new(),
            match_type: MatchType::Other(String::new()),
            target: String::new(),
            action: Action::new(""),
            comment: None,
            enabled,
            parse_fault: Some(ParseFault {
                raw: raw.into(),
                reason: reason.into(),
            }),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = (!comment.is_empty()).then_some(comment);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_faulted(&self) -> bool {
        self.parse_fault.is_some()
    }

    /// Check user input before it is sent anywhere.
    ///
    /// Faulted entries are accepted as-is since they are written back verbatim.
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.is_faulted() {
            return Ok(());
        }

        let tag = self.match_type.as_str();
        if tag.is_empty() {
            return Err(RulesError::Validation("rule type is required".into()));
        }
        if tag.contains([',', ' ', '#']) {
            return Err(RulesError::Validation(format!("malformed rule type: {tag}")));
        }

        let target = field("match target", &self.target)?;
        if self.match_type.is_logical() {
            if !parens_balanced(target) {
                return Err(RulesError::Validation(format!(
                    "{tag} target has unbalanced parentheses: {target}"
                )));
            }
        } else if target.contains(',') {
            return Err(RulesError::Validation(format!(
                "{tag} target must not contain commas: {target}"
            )));
        }

        let policy = field("policy", &self.action.policy)?;
        if policy.contains(',') {
            return Err(RulesError::Validation(format!(
                "policy must not contain commas: {policy}"
            )));
        }

        if let Some(modifier) = &self.action.modifier {
            if modifier != NO_RESOLVE {
                return Err(RulesError::Validation(format!(
                    "unsupported modifier: {modifier}"
                )));
            }
            if !self.match_type.is_ip_based() {
                return Err(RulesError::Validation(format!(
                    "{NO_RESOLVE} only applies to destination IP rules, not {tag}"
                )));
            }
        }

        let fields = [tag, target, policy, self.comment.as_deref().unwrap_or("")];
        if fields.iter().any(|f| f.contains(['\n', '\r'])) {
            return Err(RulesError::Validation("line breaks are not allowed".into()));
        }

        Ok(())
    }
}

/// A required free-text field that must survive a trip through a list file.
fn field<'a>(name: &str, value: &'a str) -> Result<&'a str, RulesError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RulesError::Validation(format!("{name} is required")));
    }
    if trimmed.len() != value.len() {
        return Err(RulesError::Validation(format!(
            "{name} must not start or end with whitespace"
        )));
    }
    if value.contains(" #") {
        return Err(RulesError::Validation(format!(
            "{name} must not contain ' #'"
        )));
    }
    Ok(value)
}

fn parens_balanced(value: &str) -> bool {
    let mut depth = 0usize;
    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_round_trip() {
        for ty in MatchType::KNOWN {
            assert_eq!(&MatchType::from(ty.as_str()), ty);
        }
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let ty = MatchType::from("SCRIPT");
        assert_eq!(ty, MatchType::Other("SCRIPT".into()));
        assert_eq!(ty.to_string(), "SCRIPT");
        assert_eq!(ty.describe(), "unrecognised rule type");
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert_eq!(MatchType::from("domain"), MatchType::Other("domain".into()));
    }

    #[test]
    fn ip_based_types() {
        assert!(MatchType::IpCidr.is_ip_based());
        assert!(MatchType::Geoip.is_ip_based());
        assert!(!MatchType::SrcIpCidr.is_ip_based());
        assert!(!MatchType::Domain.is_ip_based());
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::new("Proxy").to_string(), "Proxy");
        assert_eq!(Action::no_resolve("DIRECT").to_string(), "DIRECT,no-resolve");
    }

    #[test]
    fn validate_accepts_plain_rule() {
        let rule = Rule::new(MatchType::Domain, "example.com", Action::new("Proxy"));
        rule.validate().unwrap();
    }

    #[test]
    fn validate_requires_fields() {
        let rule = Rule::new(MatchType::Domain, "  ", Action::new("Proxy"));
        assert!(matches!(rule.validate(), Err(RulesError::Validation(_))));

        let rule = Rule::new(MatchType::Domain, "example.com", Action::new(""));
        rule.validate().unwrap_err();

        let rule = Rule::new(MatchType::Other(String::new()), "x", Action::new("Proxy"));
        rule.validate().unwrap_err();
    }

    #[test]
    fn validate_no_resolve_only_for_ip_rules() {
        let ok = Rule::new(MatchType::IpCidr, "10.0.0.0/8", Action::no_resolve("DIRECT"));
        ok.validate().unwrap();

        let bad = Rule::new(MatchType::Domain, "example.com", Action::no_resolve("DIRECT"));
        bad.validate().unwrap_err();
    }

    #[test]
    fn validate_commas_only_in_logical_payloads() {
        let logical = Rule::new(
            MatchType::And,
            "((DOMAIN,baidu.com),(NETWORK,UDP))",
            Action::new("Proxy"),
        );
        logical.validate().unwrap();

        let plain = Rule::new(MatchType::Domain, "a.com,b.com", Action::new("Proxy"));
        plain.validate().unwrap_err();
    }

    #[test]
    fn validate_rejects_comment_marker_in_policy() {
        let rule = Rule::new(MatchType::Domain, "a.com", Action::new("Group #1"));
        assert!(matches!(rule.validate(), Err(RulesError::Validation(m)) if m.contains("policy")));

        let rule = Rule::new(MatchType::Domain, "a.com", Action::new("Group#1"));
        rule.validate().unwrap();
    }

    #[test]
    fn validate_rejects_padded_fields() {
        let rule = Rule::new(MatchType::Domain, " a.com", Action::new("Proxy"));
        rule.validate().unwrap_err();

        let rule = Rule::new(MatchType::Domain, "a.com", Action::new("Proxy "));
        rule.validate().unwrap_err();
    }

    #[test]
    fn validate_parens_only_matter_for_logical_payloads() {
        let regex = Rule::new(MatchType::DomainRegex, r"^ad\(s\.com$", Action::new("Proxy"));
        regex.validate().unwrap();

        let open = Rule::new(MatchType::And, "((DOMAIN,a.com),(NETWORK,UDP)", Action::new("Proxy"));
        open.validate().unwrap_err();

        let close = Rule::new(MatchType::Not, "(DOMAIN,a.com))(", Action::new("Proxy"));
        close.validate().unwrap_err();
    }

    #[test]
    fn catch_all_is_not_offered() {
        assert!(!MatchType::KNOWN.iter().any(|ty| ty.as_str() == "MATCH"));
        assert_eq!(MatchType::from("MATCH"), MatchType::Other("MATCH".into()));
    }

    #[test]
    fn validate_rejects_line_breaks() {
        let rule = Rule::new(MatchType::Domain, "a.com", Action::new("Proxy"))
            .with_comment("two\nlines");
        rule.validate().unwrap_err();
    }

    #[test]
    fn empty_comment_is_none() {
        let rule = Rule::new(MatchType::Domain, "a.com", Action::new("Proxy")).with_comment("");
        assert!(rule.comment.is_none());
    }

    #[test]
    fn rule_serializes_tag_as_string() {
        let rule = Rule::new(MatchType::DomainSuffix, "a.com", Action::new("Proxy"));
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["match_type"], "DOMAIN-SUFFIX");
        assert_eq!(json["action"]["policy"], "Proxy");
        assert!(json.get("parse_fault").is_none());
        assert!(json.get("extra").is_none());
    }
}
