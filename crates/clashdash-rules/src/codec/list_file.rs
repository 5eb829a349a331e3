//! OpenClash custom rules file codec.
//!
//! The file is YAML-like. Only the `rules:` section is interpreted; every
//! other section is carried through byte-for-byte. Inside it, each rule is
//! one line:
//!
//! ```text
//! - DOMAIN-SUFFIX,google.com,Proxy #comment
//! ##- IP-CIDR,10.0.0.0/8,DIRECT,no-resolve
//! ```
//!
//! A `##` in front of the dash keeps a rule in the file but disabled.

use crate::codec::{Decoded, Fault, ensure_text};
use crate::error::RulesError;
use crate::rule::{Action, MatchType, Rule};

/// Name of the section holding rule lines.
pub const RULES_SECTION: &str = "rules";

const ENABLED_PREFIX: &str = "- ";
const DISABLED_PREFIX: &str = "##- ";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Other,
    Rules,
    /// A second `rules:` header; its rule lines are merged into the first.
    DuplicateRules,
}

/// Decode a rules document.
///
/// Lines that look like rules but do not split into at least
/// `type,target,policy` become faulted rules holding the raw line.
pub fn decode(raw: &str) -> Result<Decoded, RulesError> {
    ensure_text(raw)?;

    let mut decoded = Decoded::default();
    let mut in_rules = false;

    for (idx, line) in raw.lines().enumerate() {
        if let Some(name) = section_header(line) {
            in_rules = name == RULES_SECTION;
            continue;
        }
        if !in_rules {
            continue;
        }
        let Some((enabled, body)) = split_prefix(line) else {
            continue;
        };

        match parse_body(body) {
            Ok(mut rule) => {
                rule.enabled = enabled;
                decoded.rules.push(rule);
            }
            Err(reason) => {
                decoded.faults.push(Fault::line(idx + 1, reason.clone()));
                decoded.rules.push(Rule::faulted(line, enabled, reason));
            }
        }
    }

    Ok(decoded)
}

/// Re-render the `rules:` section of `original` from `rules`.
///
/// Everything outside the section is copied verbatim. Non-rule lines inside
/// it (comments, blank lines) are kept after the rendered rules. A missing
/// section is appended.
pub fn encode(rules: &[Rule], original: &str) -> String {
    let mut out = String::with_capacity(original.len() + rules.len() * 48);
    let mut kept: Vec<&str> = Vec::new();
    let mut section = Section::Other;
    let mut found = false;

    for line in original.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);

        if let Some(name) = section_header(bare) {
            if section == Section::Rules {
                write_rules(&mut out, rules, &kept);
                kept.clear();
            }

            if name == RULES_SECTION {
                if found {
                    section = Section::DuplicateRules;
                    continue;
                }
                found = true;
                section = Section::Rules;
                push_line(&mut out, line);
            } else {
                section = Section::Other;
                out.push_str(line);
            }
            continue;
        }

        match section {
            Section::Other => out.push_str(line),
            Section::Rules => {
                if split_prefix(bare).is_none() {
                    kept.push(line);
                }
            }
            Section::DuplicateRules => {
                if split_prefix(bare).is_none() {
                    out.push_str(line);
                }
            }
        }
    }

    if section == Section::Rules {
        write_rules(&mut out, rules, &kept);
    }

    if !found {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(RULES_SECTION);
        out.push_str(":\n");
        write_rules(&mut out, rules, &[]);
    }

    out
}

/// Render one rule as a line, without the trailing newline.
pub fn render_rule(rule: &Rule) -> String {
    let prefix = if rule.enabled {
        ENABLED_PREFIX
    } else {
        DISABLED_PREFIX
    };

    if let Some(fault) = &rule.parse_fault {
        return match split_prefix(&fault.raw) {
            Some((enabled, _)) if enabled == rule.enabled => fault.raw.clone(),
            Some((_, body)) => format!("{prefix}{body}"),
            None => format!("{prefix}{}", fault.raw.trim()),
        };
    }

    let mut line = format!(
        "{prefix}{},{},{}",
        rule.match_type, rule.target, rule.action
    );
    if let Some(comment) = &rule.comment {
        line.push_str(" #");
        line.push_str(comment);
    }
    line
}

fn write_rules(out: &mut String, rules: &[Rule], kept: &[&str]) {
    for rule in rules {
        out.push_str(&render_rule(rule));
        out.push('\n');
    }
    for line in kept {
        out.push_str(line);
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push('\n');
    }
}

/// `name:` at column zero.
fn section_header(line: &str) -> Option<&str> {
    let name = line.trim_end().strip_suffix(':')?;
    let first = name.chars().next()?;
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return None;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .then_some(name)
}

/// Split a candidate rule line into (enabled, body).
fn split_prefix(line: &str) -> Option<(bool, &str)> {
    let line = line.trim();
    if let Some(body) = line.strip_prefix("##-") {
        Some((false, body.trim()))
    } else {
        line.strip_prefix('-').map(|body| (true, body.trim()))
    }
}

fn parse_body(body: &str) -> Result<Rule, String> {
    let (content, comment) = match body.find(" #") {
        Some(pos) => (body[..pos].trim_end(), Some(body[pos + 2..].trim())),
        None => (body, None),
    };

    let fields = split_fields(content);
    if fields.len() < 3 {
        return Err(format!(
            "expected at least 3 comma-separated fields, found {}",
            fields.len()
        ));
    }
    if let Some(pos) = fields[..3].iter().position(|f| f.is_empty()) {
        return Err(format!("field {} is empty", pos + 1));
    }

    let modifier = (fields.len() > 3).then(|| fields[3..].join(","));
    let mut rule = Rule::new(
        MatchType::from(fields[0]),
        fields[1],
        Action {
            policy: fields[2].to_string(),
            modifier,
        },
    );
    if let Some(comment) = comment {
        rule = rule.with_comment(comment);
    }
    Ok(rule)
}

/// Split on commas. Parentheses nest only in logical rule payloads; any
/// other target may carry them literally (e.g. a regex).
fn split_fields(content: &str) -> Vec<&str> {
    let nested = content
        .split_once(',')
        .is_some_and(|(tag, _)| MatchType::from(tag.trim()).is_logical());

    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in content.char_indices() {
        match c {
            '(' if nested => depth += 1,
            ')' if nested => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                fields.push(content[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = content[start..].trim();
    if !last.is_empty() || !fields.is_empty() {
        fields.push(last);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FaultLocation;

    #[test]
    fn decode_mixed_enabled_and_disabled() {
        let raw = "rules:\n- DOMAIN,example.com,Proxy\n##- IP-CIDR,10.0.0.0/8,DIRECT,no-resolve #local\n";
        let decoded = decode(raw).unwrap();
        assert!(decoded.faults.is_empty());
        assert_eq!(decoded.rules.len(), 2);

        let first = &decoded.rules[0];
        assert!(first.enabled);
        assert_eq!(first.match_type, MatchType::Domain);
        assert_eq!(first.target, "example.com");
        assert_eq!(first.action.to_string(), "Proxy");
        assert!(first.comment.is_none());

        let second = &decoded.rules[1];
        assert!(!second.enabled);
        assert_eq!(second.match_type, MatchType::IpCidr);
        assert_eq!(second.target, "10.0.0.0/8");
        assert_eq!(second.action.to_string(), "DIRECT,no-resolve");
        assert!(second.action.is_no_resolve());
        assert_eq!(second.comment.as_deref(), Some("local"));
    }

    #[test]
    fn decode_ignores_lines_outside_rules_section() {
        let raw = "proxy-groups:\n- name: Proxy\nrules:\n- DOMAIN,a.com,Proxy\nscript:\n- DOMAIN,b.com,Proxy\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.rules.len(), 1);
        assert_eq!(decoded.rules[0].target, "a.com");
    }

    #[test]
    fn decode_skips_comments_in_rules_section() {
        let raw = "rules:\n# heading\n\n- DOMAIN,a.com,Proxy\n## note\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.rules.len(), 1);
    }

    #[test]
    fn decode_accepts_indented_rules() {
        let raw = "rules:\n  - DOMAIN-SUFFIX,a.com,Proxy\n  ##- DOMAIN-KEYWORD,ads,REJECT\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.rules.len(), 2);
        assert!(!decoded.rules[1].enabled);
    }

    #[test]
    fn decode_keeps_faulty_line() {
        let raw = "rules:\n- DOMAIN,a.com,Proxy\n- MATCH,Proxy\n- DOMAIN,b.com,DIRECT\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.rules.len(), 3);
        assert_eq!(decoded.faults.len(), 1);
        assert_eq!(decoded.faults[0].location, FaultLocation::Line(3));

        let faulted = &decoded.rules[1];
        assert!(faulted.is_faulted());
        assert_eq!(faulted.parse_fault.as_ref().unwrap().raw, "- MATCH,Proxy");
        assert_eq!(decoded.rules[2].target, "b.com");
    }

    #[test]
    fn decode_empty_field_is_fault() {
        let decoded = decode("rules:\n- DOMAIN,,Proxy\n").unwrap();
        assert!(decoded.rules[0].is_faulted());
        assert_eq!(decoded.faults[0].reason, "field 2 is empty");
    }

    #[test]
    fn decode_logical_rule() {
        let raw = "rules:\n- AND,((DOMAIN,baidu.com),(NETWORK,UDP)),Proxy\n";
        let decoded = decode(raw).unwrap();
        let rule = &decoded.rules[0];
        assert_eq!(rule.match_type, MatchType::And);
        assert_eq!(rule.target, "((DOMAIN,baidu.com),(NETWORK,UDP))");
        assert_eq!(rule.action.policy, "Proxy");
    }

    #[test]
    fn decode_unknown_type_preserved() {
        let raw = "rules:\n- SCRIPT,quic,REJECT\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.rules[0].match_type, MatchType::Other("SCRIPT".into()));
        assert_eq!(encode(&decoded.rules, raw), raw);
    }

    #[test]
    fn decode_rejects_binary() {
        decode("rules:\n\0").unwrap_err();
    }

    #[test]
    fn round_trip_preserves_other_sections() {
        let raw = "\
proxies:
  - name: a
    type: ss
rules:
- DOMAIN,x.com,Proxy
##- DOMAIN-SUFFIX,y.com,DIRECT #off

script:
  code: |
    def main(ctx, md):
      return 'DIRECT'
";
        let decoded = decode(raw).unwrap();
        assert_eq!(encode(&decoded.rules, raw), raw);
    }

    #[test]
    fn faulty_line_round_trips_verbatim() {
        let raw = "rules:\n  -MATCH,Proxy\n##-broken\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.faults.len(), 2);
        assert_eq!(encode(&decoded.rules, raw), raw);
    }

    #[test]
    fn toggled_fault_is_reprefixed() {
        let raw = "rules:\n- MATCH,Proxy\n";
        let mut decoded = decode(raw).unwrap();
        decoded.rules[0].enabled = false;
        assert_eq!(encode(&decoded.rules, raw), "rules:\n##- MATCH,Proxy\n");
    }

    #[test]
    fn encode_renders_comment_and_prefix() {
        let rule = Rule::new(MatchType::DomainSuffix, "a.com", Action::new("Proxy"))
            .with_comment("work")
            .disabled();
        assert_eq!(render_rule(&rule), "##- DOMAIN-SUFFIX,a.com,Proxy #work");
    }

    #[test]
    fn encode_appends_missing_section() {
        let rules = vec![Rule::new(MatchType::Domain, "a.com", Action::new("Proxy"))];
        assert_eq!(
            encode(&rules, "dns:\n  enable: true"),
            "dns:\n  enable: true\nrules:\n- DOMAIN,a.com,Proxy\n"
        );
        assert_eq!(encode(&rules, ""), "rules:\n- DOMAIN,a.com,Proxy\n");
    }

    #[test]
    fn encode_header_without_newline() {
        let rules = vec![Rule::new(MatchType::Domain, "a.com", Action::new("Proxy"))];
        assert_eq!(encode(&rules, "rules:"), "rules:\n- DOMAIN,a.com,Proxy\n");
    }

    #[test]
    fn encode_empty_rule_list_keeps_header() {
        let raw = "rules:\n- DOMAIN,a.com,Proxy\n";
        assert_eq!(encode(&[], raw), "rules:\n");
    }

    #[test]
    fn encode_preserves_order_after_mutation() {
        let raw = "rules:\n- DOMAIN,a.com,A\n- DOMAIN,b.com,B\n- DOMAIN,c.com,C\n";
        let mut rules = decode(raw).unwrap().rules;
        rules.swap(0, 2);
        let encoded = encode(&rules, raw);
        assert_eq!(encoded, "rules:\n- DOMAIN,c.com,C\n- DOMAIN,b.com,B\n- DOMAIN,a.com,A\n");

        let targets: Vec<_> = decode(&encoded)
            .unwrap()
            .rules
            .into_iter()
            .map(|r| r.target)
            .collect();
        assert_eq!(targets, ["c.com", "b.com", "a.com"]);
    }

    #[test]
    fn duplicate_rules_section_is_merged() {
        let raw = "rules:\n- DOMAIN,a.com,A\nother:\n  k: v\nrules:\n- DOMAIN,b.com,B\n# tail\n";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.rules.len(), 2);
        assert_eq!(
            encode(&decoded.rules, raw),
            "rules:\n- DOMAIN,a.com,A\n- DOMAIN,b.com,B\nother:\n  k: v\n# tail\n"
        );
    }

    #[test]
    fn split_fields_nested_parens() {
        assert_eq!(
            split_fields("OR,((NETWORK,UDP),(DOMAIN,a.com)),REJECT"),
            ["OR", "((NETWORK,UDP),(DOMAIN,a.com))", "REJECT"]
        );
        assert!(split_fields("").is_empty());
    }

    #[test]
    fn split_fields_literal_parens_outside_logical_rules() {
        assert_eq!(
            split_fields(r"DOMAIN-REGEX,^ad\(s\.com$,Proxy"),
            ["DOMAIN-REGEX", r"^ad\(s\.com$", "Proxy"]
        );
        assert_eq!(
            split_fields("PROCESS-NAME-REGEX,(?i)tele(gram,DIRECT"),
            ["PROCESS-NAME-REGEX", "(?i)tele(gram", "DIRECT"]
        );
    }

    #[test]
    fn validated_rules_reload_unchanged() {
        let rules = vec![
            Rule::new(MatchType::DomainRegex, r"^ad\(s\.com$", Action::new("Proxy")),
            Rule::new(MatchType::Domain, "a.com", Action::new("Group#1")).with_comment("x #y"),
            Rule::new(
                MatchType::Or,
                "((NETWORK,UDP),(DOMAIN,a.com))",
                Action::new("REJECT"),
            ),
        ];
        for rule in &rules {
            rule.validate().unwrap();
        }

        let decoded = decode(&encode(&rules, "rules:\n")).unwrap();
        assert!(decoded.faults.is_empty(), "{:?}", decoded.faults);
        for (before, after) in rules.iter().zip(&decoded.rules) {
            assert_eq!(after.match_type, before.match_type);
            assert_eq!(after.target, before.target);
            assert_eq!(after.action, before.action);
            assert_eq!(after.comment, before.comment);
        }
    }

    #[test]
    fn section_header_rules() {
        assert_eq!(section_header("rules:"), Some("rules"));
        assert_eq!(section_header("proxy-groups:"), Some("proxy-groups"));
        assert_eq!(section_header("  rules:"), None);
        assert_eq!(section_header("- rules:"), None);
        assert_eq!(section_header("rules: []"), None);
    }
}
