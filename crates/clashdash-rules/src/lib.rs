//! Rule model and codecs for remotely stored Clash rule lists.
//!
//! Two persistence formats are supported, sharing one [`Rule`] value type:
//!
//! - **List file** ([`codec::list_file`]): the OpenClash custom rules file, a
//!   YAML-like document whose `rules:` section holds one rule per line.
//!   Disabled rules stay in the file behind a `##` prefix.
//! - **Indexed store** ([`codec::uci`]): a flat UCI dump where every rule is an
//!   anonymous `@rule[N]` section. Writes are plans of UCI primitives rather
//!   than a single document.
//!
//! Decoding never fails on a single bad entry. Faulty lines are kept as rules
//! with a [`ParseFault`] so they survive re-encoding untouched.
//!
//! # Example
//!
//! ```
//! use clashdash_rules::codec::list_file;
//!
//! let raw = "rules:\n- DOMAIN,example.com,Proxy\n##- IP-CIDR,10.0.0.0/8,DIRECT,no-resolve #local\n";
//! let decoded = list_file::decode(raw).unwrap();
//! assert_eq!(decoded.rules.len(), 2);
//! assert!(!decoded.rules[1].enabled);
//! assert_eq!(list_file::encode(&decoded.rules, raw), raw);
//! ```

pub mod codec;
pub mod error;
pub mod rule;

pub use codec::{Decoded, Fault, FaultLocation, shell_quote};
pub use error::RulesError;
pub use rule::{Action, MatchType, NO_RESOLVE, ParseFault, Rule, RuleId};
