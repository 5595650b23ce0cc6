// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Expand every `${NAME}` in `input` from the process environment.
///
/// An unterminated or empty reference is kept literally. A reference to an
/// unset variable is an error rather than an empty string, so a missing
/// `AGENT_BASE_URL` fails at startup instead of producing a relative URL.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(0) | None => {
                out.push_str("${");
                rest = after;
            }
            Some(close) => {
                let name = &after[..close];
                let value = std::env::var(name).map_err(|_| ConfigError::UndefinedVariable {
                    name: name.to_owned(),
                })?;
                out.push_str(&value);
                rest = &after[close + 1..];
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}
