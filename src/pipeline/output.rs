//! Output filtering: which collections of an event get serialized.
//!
//! Commands are `"keep <pattern>"` or `"drop <pattern>"`, where `pattern` is a glob
//! (`*` matches any run of characters, `?` a single one). They are applied in order
//! and the last one that matches a collection name decides; names no command
//! matches are dropped. The usual setup keeps everything and drops the raw cell
//! collections once positioned copies exist:
//!
//! ```
//! use calo_positions::pipeline::output::OutputCommands;
//!
//! let commands = OutputCommands::parse(&["keep *", "drop ECalBarrelCells"])?;
//! assert!(commands.is_kept("ECalBarrelCellPositions"));
//! assert!(!commands.is_kept("ECalBarrelCells"));
//! # Ok::<(), calo_positions::error::CaloError>(())
//! ```
use crate::error::{CaloError, CaloResult};
use crate::pipeline::event_store::{Collection, EventStore};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static MATCH_ANYTHING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*$").expect("Invalid match-anything regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAction {
    Keep,
    Drop,
}

/// One `keep`/`drop` command with its glob compiled to an anchored regex.
#[derive(Debug, Clone)]
pub struct OutputRule {
    action: OutputAction,
    pattern: String,
    regex: Regex,
}

impl OutputRule {
    /// # Errors
    ///
    /// `CaloError::Configuration` if the glob does not compile.
    pub fn new(action: OutputAction, pattern: &str) -> CaloResult<Self> {
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
            CaloError::Configuration(format!("invalid output pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            action,
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn action(&self) -> OutputAction {
        self.action
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl fmt::Display for OutputRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            OutputAction::Keep => "keep",
            OutputAction::Drop => "drop",
        };
        write!(f, "{} {}", action, self.pattern)
    }
}

/// `*` matches any run of characters, `?` exactly one; everything else is literal.
fn glob_to_regex(pattern: &str) -> String {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    anchored.push('^');
    for c in pattern.chars() {
        match c {
            '*' => anchored.push_str(".*"),
            '?' => anchored.push('.'),
            c => anchored.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    anchored.push('$');
    anchored
}

#[derive(Debug, Clone)]
pub struct OutputCommands {
    rules: Vec<OutputRule>,
}

impl Default for OutputCommands {
    /// Keeps every collection.
    fn default() -> Self {
        Self {
            rules: vec![OutputRule {
                action: OutputAction::Keep,
                pattern: "*".to_string(),
                regex: MATCH_ANYTHING.clone(),
            }],
        }
    }
}

impl OutputCommands {
    /// # Errors
    ///
    /// `CaloError::Configuration` for anything that is not `keep <pattern>` or
    /// `drop <pattern>`.
    pub fn parse<S: AsRef<str>>(commands: &[S]) -> CaloResult<Self> {
        let rules = commands
            .iter()
            .map(|command| {
                let command = command.as_ref();
                let mut parts = command.split_whitespace();
                let action = match parts.next() {
                    Some("keep") => OutputAction::Keep,
                    Some("drop") => OutputAction::Drop,
                    _ => {
                        return Err(CaloError::Configuration(format!(
                            "output command '{}' must start with 'keep' or 'drop'",
                            command
                        )))
                    }
                };
                match (parts.next(), parts.next()) {
                    (Some(pattern), None) => OutputRule::new(action, pattern),
                    _ => Err(CaloError::Configuration(format!(
                        "output command '{}' must name exactly one collection pattern",
                        command
                    ))),
                }
            })
            .collect::<CaloResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[OutputRule] {
        &self.rules
    }

    pub fn is_kept(&self, name: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(name))
            .is_some_and(|rule| rule.action == OutputAction::Keep)
    }

    /// The collections of `store` that survive the filter, in store order.
    pub fn kept<'a>(&'a self, store: &'a EventStore) -> impl Iterator<Item = (&'a str, &'a Collection)> + 'a {
        store.iter().filter(move |(name, _)| self.is_kept(name))
    }
}
