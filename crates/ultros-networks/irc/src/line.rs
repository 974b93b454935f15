//! The IRC line grammar.
//!
//! ```text
//! [@tag1=value;tag2 ][:prefix ]COMMAND[ param ...][ :trailing param]
//! ```
//!
//! Parsing is lenient: runs of spaces between tokens are collapsed and tag
//! values are kept exactly as sent, without unescaping. Writing produces the
//! same grammar, so a parsed line displays as an equivalent wire line.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use crate::error::{IrcError, IrcResult};

/// One IRC protocol line, without its CRLF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcLine {
    /// IRCv3 message tags. A tag sent without `=` maps to `None`.
    pub tags: BTreeMap<String, Option<String>>,
    /// Source of the line, e.g. `nick!user@host` or a server name.
    pub prefix: Option<String>,
    /// Upper-cased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
    trailing: bool,
}

impl IrcLine {
    /// Starts building an outgoing line.
    ///
    /// ```rust,ignore
    /// let line = IrcLine::new("user").param("ultros").param("0").param("*").trailing("Ultros");
    /// assert_eq!(line.to_string(), "USER ultros 0 * :Ultros");
    /// ```
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into().to_ascii_uppercase(),
            ..Self::default()
        }
    }

    /// Parses a line received from the wire.
    pub fn parse(line: &str) -> IrcResult<Self> {
        let mut rest = line;

        let mut tags = BTreeMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (block, remainder) = split_token(stripped);
            for pair in block.split(';').filter(|pair| !pair.is_empty()) {
                let (key, value) = match pair.split_once('=') {
                    Some((key, value)) => (key, Some(value.to_owned())),
                    None => (pair, None),
                };
                tags.entry(key.to_owned()).or_insert(value);
            }
            rest = remainder;
        }

        rest = rest.trim_start_matches(' ');
        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (token, remainder) = split_token(stripped);
            prefix = Some(token.to_owned());
            rest = remainder;
        }

        let (command, mut rest) = split_token(rest.trim_start_matches(' '));
        if command.is_empty() {
            return Err(IrcError::MissingCommand(line.to_owned()));
        }

        let mut params = Vec::new();
        let mut trailing = false;
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(text) = rest.strip_prefix(':') {
                params.push(text.to_owned());
                trailing = true;
                break;
            }
            let (token, remainder) = split_token(rest);
            params.push(token.to_owned());
            rest = remainder;
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
            trailing,
        })
    }

    // =========================================================================
    // Builder
    // =========================================================================

    /// Adds a tag with a value.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), Some(value.into()));
        self
    }

    /// Adds a tag without a value.
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.tags.insert(key.into(), None);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Appends a middle parameter.
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Appends the final parameter, always written with a leading `:`.
    pub fn trailing(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self.trailing = true;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Whether the last parameter was (or will be) written in trailing form.
    pub fn has_trailing(&self) -> bool {
        self.trailing
    }

    pub fn param_at(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn last_param(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Fails unless the line has at least `count` parameters.
    pub fn require_params(&self, count: usize) -> IrcResult<()> {
        if self.params.len() < count {
            return Err(IrcError::MissingParams {
                command: self.command.clone(),
                expected: count,
                actual: self.params.len(),
            });
        }
        Ok(())
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split(['!', '@']).next().filter(|nick| !nick.is_empty())
    }

    /// Whether the command is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// Serialises the line for sending, rejecting embedded CR, LF and NUL.
    pub fn to_wire(&self) -> IrcResult<String> {
        let wire = self.to_string();
        if wire.contains(['\r', '\n', '\0']) {
            return Err(IrcError::ForbiddenCharacter(wire));
        }
        Ok(wire)
    }
}

impl FromStr for IrcLine {
    type Err = IrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IrcLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_char('@')?;
            for (index, (key, value)) in self.tags.iter().enumerate() {
                if index > 0 {
                    f.write_char(';')?;
                }
                f.write_str(key)?;
                if let Some(value) = value {
                    write!(f, "={value}")?;
                }
            }
            f.write_char(' ')?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            if self.trailing || needs_trailing(last) {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

fn split_token(s: &str) -> (&str, &str) {
    s.split_once(' ').unwrap_or((s, ""))
}

fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.starts_with(':') || param.contains(' ')
}
