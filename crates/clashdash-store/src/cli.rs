//! CLI module for clashdash rules.
//!
//! Every invocation loads the rules once and performs at most one edit.
//! Positions are 1-based, as printed by `list`.
//!
//! # Usage
//!
//! ```bash
//! # Show rules
//! clashdash rules -c clashdash.toml list
//!
//! # Add a rule at the top
//! clashdash rules add --type DOMAIN-SUFFIX --target example.com --policy Proxy --front
//!
//! # Move rule 5 to position 1
//! clashdash rules move 5 1
//!
//! # Show the match types a rule can use
//! clashdash rules types
//!
//! # Turn custom rules off without touching individual rules
//! clashdash rules switch off
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clashdash_rules::{Action, MatchType, Rule};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{build_store, load_config};
use crate::error::StoreError;
use crate::ruleset::RuleSet;
use crate::store::RuleStore;

/// Rule management CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "clashdash-rules", version, about = "Manage router routing rules")]
pub struct RulesArgs {
    /// Config file path.
    #[arg(short, long, default_value = "clashdash.toml")]
    pub config: PathBuf,

    /// Log level override.
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: RulesCommand,
}

/// Rules CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum RulesCommand {
    /// List rules in match order.
    List {
        /// Print the rule set as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a rule.
    Add {
        /// Match type (e.g. DOMAIN-SUFFIX, IP-CIDR, GEOIP).
        #[arg(short = 't', long = "type")]
        match_type: String,

        /// Match payload.
        #[arg(long)]
        target: String,

        /// Policy or proxy group.
        #[arg(short, long)]
        policy: String,

        /// Skip DNS resolution (IP match types only).
        #[arg(long)]
        no_resolve: bool,

        #[arg(long)]
        comment: Option<String>,

        /// Insert before all other rules instead of after.
        #[arg(long)]
        front: bool,

        /// Add the rule disabled.
        #[arg(long)]
        disabled: bool,
    },

    /// Edit the rule at a position.
    Edit {
        position: usize,

        #[arg(short = 't', long = "type")]
        match_type: Option<String>,

        #[arg(long)]
        target: Option<String>,

        #[arg(short, long)]
        policy: Option<String>,

        #[arg(long, conflicts_with = "resolve")]
        no_resolve: bool,

        /// Drop the no-resolve modifier.
        #[arg(long)]
        resolve: bool,

        /// New comment; an empty string removes it.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Delete the rule at a position.
    Delete { position: usize },

    /// Enable or disable the rule at a position.
    Toggle { position: usize },

    /// Move a rule to another position.
    Move { from: usize, to: usize },

    /// Turn the whole rule set on or off.
    Switch { state: SwitchState },

    /// Print the known match types with an example target each.
    Types,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

/// Run a rules command with the given CLI arguments.
pub async fn run(args: RulesArgs) -> Result<(), Box<dyn std::error::Error>> {
    if matches!(args.command, RulesCommand::Types) {
        print!("{}", render_types());
        return Ok(());
    }

    let mut config = load_config(&args.config)?;
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.clone());
    }
    init_tracing(config.log_level.as_deref());

    let store = build_store(&config, CancellationToken::new())?;
    store.load().await?;
    execute(&store, args.command).await?;
    Ok(())
}

/// Apply one command to a loaded store.
pub async fn execute(store: &RuleStore, command: RulesCommand) -> Result<(), StoreError> {
    match command {
        RulesCommand::Types => print!("{}", render_types()),
        RulesCommand::List { json } => {
            let snapshot = store.snapshot();
            if json {
                let text = serde_json::to_string_pretty(&snapshot.rules)
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                println!("{text}");
            } else {
                print!("{}", render_list(&snapshot.rules));
            }
        }
        RulesCommand::Add {
            match_type,
            target,
            policy,
            no_resolve,
            comment,
            front,
            disabled,
        } => {
            let action = if no_resolve {
                Action::no_resolve(policy)
            } else {
                Action::new(policy)
            };
            let mut rule = Rule::new(MatchType::from(match_type), target, action);
            if let Some(comment) = comment {
                rule = rule.with_comment(comment);
            }
            rule.enabled = !disabled;
            store.insert(rule, front).await?;
            println!("rule added");
        }
        RulesCommand::Edit {
            position,
            match_type,
            target,
            policy,
            no_resolve,
            resolve,
            comment,
        } => {
            let mut rule = rule_at(&store.snapshot().rules, position)?.clone();
            if rule.is_faulted() {
                if match_type.is_none() || target.is_none() || policy.is_none() {
                    return Err(StoreError::Validation(format!(
                        "rule {position} could not be parsed; --type, --target and --policy are all required"
                    )));
                }
                rule.parse_fault = None;
            }
            if let Some(match_type) = match_type {
                rule.match_type = MatchType::from(match_type);
            }
            if let Some(target) = target {
                rule.target = target;
            }
            if let Some(policy) = policy {
                rule.action.policy = policy;
            }
            if no_resolve {
                rule.action = Action::no_resolve(rule.action.policy);
            } else if resolve {
                rule.action.modifier = None;
            }
            if let Some(comment) = comment {
                rule = rule.with_comment(comment);
            }
            store.update(rule).await?;
            println!("rule {position} updated");
        }
        RulesCommand::Delete { position } => {
            let id = rule_at(&store.snapshot().rules, position)?.id;
            store.delete(id).await?;
            println!("rule {position} deleted");
        }
        RulesCommand::Toggle { position } => {
            let id = rule_at(&store.snapshot().rules, position)?.id;
            store.toggle(id).await?;
            println!("rule {position} toggled");
        }
        RulesCommand::Move { from, to } => {
            let set = store.snapshot().rules;
            rule_at(&set, from)?;
            rule_at(&set, to)?;
            let mut order: Vec<_> = set.rules.iter().map(|r| r.id).collect();
            let id = order.remove(from - 1);
            order.insert(to - 1, id);
            store.reorder(&order).await?;
            println!("rule {from} moved to {to}");
        }
        RulesCommand::Switch { state } => {
            store.set_master_enabled(state == SwitchState::On).await?;
            println!(
                "custom rules {}",
                if state == SwitchState::On { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

fn rule_at(set: &RuleSet, position: usize) -> Result<&Rule, StoreError> {
    position
        .checked_sub(1)
        .and_then(|i| set.rules.get(i))
        .ok_or_else(|| {
            StoreError::Validation(format!(
                "no rule at position {position} (have {})",
                set.len()
            ))
        })
}

fn render_list(set: &RuleSet) -> String {
    let mut out = format!(
        "custom rules: {}\n",
        if set.master_enabled { "enabled" } else { "disabled" }
    );
    for (i, rule) in set.rules.iter().enumerate() {
        let mark = match (&rule.parse_fault, rule.enabled) {
            (Some(_), _) => "!",
            (None, true) => "x",
            (None, false) => " ",
        };
        let body = match &rule.parse_fault {
            Some(fault) => format!("{}  ({})", fault.raw.trim(), fault.reason),
            None => format!("{},{},{}", rule.match_type, rule.target, rule.action),
        };
        out.push_str(&format!("{:>4} [{mark}] {body}", i + 1));
        if let Some(comment) = &rule.comment {
            out.push_str(&format!("  # {comment}"));
        }
        out.push('\n');
    }
    out
}

fn render_types() -> String {
    let width = MatchType::KNOWN
        .iter()
        .map(|ty| ty.as_str().len())
        .max()
        .unwrap_or(0);
    MatchType::KNOWN
        .iter()
        .map(|ty| {
            format!(
                "{:<width$}  {} (e.g. {})\n",
                ty.as_str(),
                ty.describe(),
                ty.example().unwrap_or("-")
            )
        })
        .collect()
}

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_new(level.unwrap_or("info")).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
