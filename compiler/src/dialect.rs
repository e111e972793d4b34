// dialect.rs — Script dialects
//
// The two dialects share one grammar and differ only in how statements are
// framed: which tokens terminate a statement and whether a line must be
// explicitly continued. Selected by the caller per compile; never global.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Statement-framing rules for a script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Statements end with `;` and may span lines freely.
    #[default]
    Standard,
    /// Statements end with `;` or a newline; a statement continued onto the
    /// next line needs a trailing `\`.
    Extended,
}

impl Dialect {
    /// Whether a newline ends a statement.
    pub const fn newline_terminates(self) -> bool {
        matches!(self, Dialect::Extended)
    }

    /// The line-continuation marker, if the dialect has one.
    pub const fn continuation_marker(self) -> Option<char> {
        match self {
            Dialect::Standard => None,
            Dialect::Extended => Some('\\'),
        }
    }

    /// Whether the end of input ends an unterminated final statement.
    pub const fn eof_terminates(self) -> bool {
        self.newline_terminates()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Standard => "standard",
            Dialect::Extended => "extended",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
