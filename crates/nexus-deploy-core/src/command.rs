//! Program + argument vector for one remote session.

use serde::Serialize;

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Full argv, program first.
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Shell-quoted rendering for logs and dry runs.
    #[must_use]
    pub fn display(&self) -> String {
        self.argv()
            .into_iter()
            .map(|part| {
                shlex::try_quote(part).map_or_else(|_| part.to_string(), |q| q.into_owned())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
