//! UCI indexed-store codec.
//!
//! Rules live in anonymous sections of one package, as printed by `uci show`:
//!
//! ```text
//! nikki.@rule[0]=rule
//! nikki.@rule[0].type='DOMAIN'
//! nikki.@rule[0].match='x.com'
//! nikki.@rule[0].node='Proxy'
//! nikki.@rule[0].enabled='1'
//! ```
//!
//! There is no single document to overwrite. Writes are [`UciOp`] plans that
//! the caller renders into shell commands and runs in order; nothing is
//! persisted until the final `commit`.

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{Fault, ensure_text, shell_quote};
use crate::error::RulesError;
use crate::rule::{Action, MatchType, Rule};

/// UCI section type holding one rule.
pub const SECTION_TYPE: &str = "rule";

/// Known rule option names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Type,
    Match,
    Node,
    Enabled,
    Comment,
    NoResolve,
}

impl Property {
    pub fn as_str(self) -> &'static str {
        match self {
            Property::Type => "type",
            Property::Match => "match",
            Property::Node => "node",
            Property::Enabled => "enabled",
            Property::Comment => "comment",
            Property::NoResolve => "no_resolve",
        }
    }

    /// Options always written from the rule's own fields.
    const MODELLED: [Property; 5] = [
        Property::Type,
        Property::Match,
        Property::Node,
        Property::Enabled,
        Property::Comment,
    ];

    /// Whether `option` is derived from the rule rather than kept in
    /// [`Rule::extra`]. `no_resolve` is derived only for destination IP types.
    fn derives(option: &str, match_type: &MatchType) -> bool {
        Self::MODELLED.iter().any(|p| p.as_str() == option)
            || (option == Property::NoResolve.as_str() && match_type.is_ip_based())
    }
}

/// A section missing one of `type`, `match` or `node`.
///
/// Its options are kept so a rewrite can put them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteSection {
    pub index: usize,
    pub options: BTreeMap<String, String>,
}

/// Decoded `uci show` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UciDecoded {
    /// Complete rules, in ascending section order.
    pub rules: Vec<Rule>,
    pub faults: Vec<Fault>,
    pub incomplete: Vec<IncompleteSection>,
    /// Number of rule sections present on the device.
    pub sections: usize,
}

/// Target section of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRef {
    Index(usize),
    /// The most recently added section.
    Last,
}

impl fmt::Display for SectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionRef::Index(i) => write!(f, "@{SECTION_TYPE}[{i}]"),
            SectionRef::Last => write!(f, "@{SECTION_TYPE}[-1]"),
        }
    }
}

/// One UCI primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciOp {
    Delete(SectionRef),
    Add,
    Set {
        section: SectionRef,
        option: String,
        value: String,
    },
    Commit,
}

impl UciOp {
    fn set(option: &str, value: impl Into<String>) -> Self {
        UciOp::Set {
            section: SectionRef::Last,
            option: option.to_string(),
            value: value.into(),
        }
    }

    /// Render as a `uci` command line for `package`.
    pub fn render(&self, package: &str) -> String {
        match self {
            UciOp::Delete(section) => format!("uci delete {package}.{section}"),
            UciOp::Add => format!("uci add {package} {SECTION_TYPE} >/dev/null"),
            UciOp::Set {
                section,
                option,
                value,
            } => format!(
                "uci set {package}.{section}.{option}={}",
                shell_quote(value)
            ),
            UciOp::Commit => format!("uci commit {package}"),
        }
    }
}

/// Staged rewrite of every rule section.
///
/// Each step is meant to be one remote call. Nothing is persisted until
/// [`commit`](Self::commit) runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePlan {
    /// Deletes of every existing section, highest index first.
    pub clear: Vec<UciOp>,
    /// `add` + `set` for each rule, then each carried incomplete section.
    pub fill: Vec<UciOp>,
    pub commit: UciOp,
}

impl RewritePlan {
    /// Non-empty steps in execution order.
    pub fn steps(&self) -> Vec<&[UciOp]> {
        [
            self.clear.as_slice(),
            self.fill.as_slice(),
            std::slice::from_ref(&self.commit),
        ]
        .into_iter()
        .filter(|step| !step.is_empty())
        .collect()
    }
}

/// Decode `uci show` output for the `@rule` sections of a package.
///
/// Lines for other section types are ignored. Sections are emitted in
/// ascending index order; those missing a mandatory option become faults.
pub fn decode(raw: &str) -> Result<UciDecoded, RulesError> {
    ensure_text(raw)?;

    let mut sections: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
    let mut decoded = UciDecoded::default();
    let marker = format!(".@{SECTION_TYPE}[");

    for line in raw.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Some(start) = key.find(&marker) else {
            continue;
        };
        let rest = &key[start + marker.len()..];
        let Some((index, option)) = rest.split_once(']') else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };

        let options = sections.entry(index).or_default();
        if let Some(option) = option.strip_prefix('.') {
            options.insert(option.to_string(), unquote(value));
        }
    }

    decoded.sections = sections.keys().next_back().map_or(0, |last| last + 1);

    for (index, options) in sections {
        let missing: Vec<&str> = [Property::Type, Property::Match, Property::Node]
            .into_iter()
            .map(Property::as_str)
            .filter(|name| options.get(*name).is_none_or(|v| v.is_empty()))
            .collect();

        if !missing.is_empty() {
            decoded.faults.push(Fault::section(
                index,
                format!("missing {}", missing.join(", ")),
            ));
            decoded.incomplete.push(IncompleteSection { index, options });
            continue;
        }

        decoded.rules.push(section_to_rule(&options));
    }

    Ok(decoded)
}

fn section_to_rule(options: &BTreeMap<String, String>) -> Rule {
    let get = |p: Property| options.get(p.as_str()).map(String::as_str);

    let match_type = MatchType::from(get(Property::Type).unwrap_or_default());
    let no_resolve = get(Property::NoResolve) == Some("1") && match_type.is_ip_based();
    let policy = get(Property::Node).unwrap_or_default();
    let action = if no_resolve {
        Action::no_resolve(policy)
    } else {
        Action::new(policy)
    };

    let mut rule = Rule::new(match_type, get(Property::Match).unwrap_or_default(), action);
    rule.enabled = get(Property::Enabled) != Some("0");
    if let Some(comment) = get(Property::Comment) {
        rule = rule.with_comment(comment);
    }
    rule.extra = options
        .iter()
        .filter(|(option, _)| !Property::derives(option, &rule.match_type))
        .map(|(option, value)| (option.clone(), value.clone()))
        .collect();
    rule
}

/// Plan a full rewrite replacing `existing` sections with `rules`.
pub fn plan_rewrite(existing: usize, rules: &[Rule], carry: &[IncompleteSection]) -> RewritePlan {
    let clear = (0..existing)
        .rev()
        .map(|i| UciOp::Delete(SectionRef::Index(i)))
        .collect();

    let mut fill = Vec::with_capacity(rules.len() * 6 + carry.len() * 4);
    for rule in rules {
        fill.extend(rule_ops(rule));
    }
    for section in carry {
        fill.push(UciOp::Add);
        for (option, value) in &section.options {
            fill.push(UciOp::set(option, value.as_str()));
        }
    }

    RewritePlan {
        clear,
        fill,
        commit: UciOp::Commit,
    }
}

/// `add` followed by the `set`s describing `rule`, then its carried options.
pub fn rule_ops(rule: &Rule) -> Vec<UciOp> {
    let mut ops = vec![
        UciOp::Add,
        UciOp::set(Property::Type.as_str(), rule.match_type.as_str()),
        UciOp::set(Property::Match.as_str(), rule.target.as_str()),
        UciOp::set(Property::Node.as_str(), rule.action.policy.as_str()),
        UciOp::set(Property::Enabled.as_str(), if rule.enabled { "1" } else { "0" }),
    ];
    if let Some(comment) = &rule.comment {
        ops.push(UciOp::set(Property::Comment.as_str(), comment.as_str()));
    }
    if rule.action.is_no_resolve() && rule.match_type.is_ip_based() {
        ops.push(UciOp::set(Property::NoResolve.as_str(), "1"));
    }
    for (option, value) in &rule.extra {
        if !Property::derives(option, &rule.match_type) {
            ops.push(UciOp::set(option, value.as_str()));
        }
    }
    ops
}

/// Strip the single quotes `uci show` puts around values.
fn unquote(value: &str) -> String {
    let value = value.trim();
    match value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
    {
        Some(inner) => inner.replace(r"'\''", "'"),
        None => value.to_string(),
    }
}
