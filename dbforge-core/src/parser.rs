//! Splits migration file contents into an up block and a down block.
//!
//! One `Error` variant per distinct failure, with context captured at the error site.

use std::collections::HashMap;

use crate::error::Error;

const UP_DIRECTIVE: &str = "migrate:up";
const DOWN_DIRECTIVE: &str = "migrate:down";

/// Recognized per-block options. Unknown keys are kept but never consulted, matching
/// `SPEC_FULL.md` §4.2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockOptions {
    raw: HashMap<String, String>,
}

impl BlockOptions {
    /// `false` iff the option was literally the string `"false"`; `true` otherwise,
    /// including when the option is absent.
    pub fn transaction(&self) -> bool {
        self.raw.get("transaction").map(String::as_str) != Some("false")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }
}

/// A migration file split into its up and down directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMigration {
    pub up: String,
    pub up_options: BlockOptions,
    pub down: String,
    pub down_options: BlockOptions,
}

/// Returns `Some(directive)` if `line` is `-- <directive>` at column 0 (optional
/// whitespace between `--` and the directive name), `None` otherwise.
fn directive_line(line: &str, directive: &str) -> bool {
    let Some(rest) = line.strip_prefix("--") else {
        return false;
    };
    let rest = rest.trim_start();
    rest == directive || rest.starts_with(&format!("{directive} "))
}

fn find_directive_line(contents: &str, directive: &str) -> Option<usize> {
    let mut offset = 0;
    for line in contents.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if directive_line(trimmed, directive) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn parse_options(first_line: &str, directive: &str) -> BlockOptions {
    let rest = first_line
        .trim_start_matches("--")
        .trim_start()
        .strip_prefix(directive)
        .unwrap_or("");

    let mut raw = HashMap::new();
    for token in rest.split_whitespace() {
        if let Some((k, v)) = token.split_once(':') {
            if !k.is_empty() && !v.is_empty() && token.matches(':').count() == 1 {
                raw.insert(k.to_string(), v.to_string());
            }
        }
    }
    BlockOptions { raw }
}

/// Parse a migration file's contents. `filename` is used only to annotate errors.
pub fn parse(filename: &str, contents: &str) -> Result<ParsedMigration, Error> {
    let up_pos = find_directive_line(contents, UP_DIRECTIVE);
    let down_pos = find_directive_line(contents, DOWN_DIRECTIVE);

    let up_pos = up_pos.ok_or_else(|| Error::ParseMissingUp {
        filename: filename.to_string(),
    })?;
    let down_pos = down_pos.ok_or_else(|| Error::ParseMissingDown {
        filename: filename.to_string(),
    })?;

    if down_pos < up_pos {
        return Err(Error::ParseWrongOrder {
            filename: filename.to_string(),
        });
    }

    let preamble = &contents[..up_pos];
    for line in preamble.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("--") {
            continue;
        }
        return Err(Error::ParseUnexpectedStmt {
            filename: filename.to_string(),
            line: line.to_string(),
        });
    }

    let up = contents[up_pos..down_pos].to_string();
    let down = contents[down_pos..].to_string();

    let up_first_line = up.lines().next().unwrap_or("");
    let down_first_line = down.lines().next().unwrap_or("");

    Ok(ParsedMigration {
        up_options: parse_options(up_first_line, UP_DIRECTIVE),
        down_options: parse_options(down_first_line, DOWN_DIRECTIVE),
        up,
        down,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_migration() {
        let contents = "-- migrate:up\nCREATE TABLE foo (id int);\n-- migrate:down\nDROP TABLE foo;\n";
        let parsed = parse("20200101000000_x.sql", contents).unwrap();
        assert!(parsed.up.starts_with("-- migrate:up"));
        assert!(parsed.up.contains("CREATE TABLE"));
        assert!(parsed.down.starts_with("-- migrate:down"));
        assert!(parsed.down.contains("DROP TABLE"));
        assert!(parsed.up_options.transaction());
        assert!(parsed.down_options.transaction());
    }

    #[test]
    fn missing_down_fails() {
        let contents = "-- migrate:up\nCREATE TABLE foo (id int);\n";
        let err = parse("x.sql", contents).unwrap_err();
        assert!(matches!(err, Error::ParseMissingDown { .. }));
    }

    #[test]
    fn missing_up_fails() {
        let contents = "-- migrate:down\nDROP TABLE foo;\n";
        let err = parse("x.sql", contents).unwrap_err();
        assert!(matches!(err, Error::ParseMissingUp { .. }));
    }

    #[test]
    fn wrong_order_fails() {
        let contents = "-- migrate:down\nDROP TABLE foo;\n\n-- migrate:up\nCREATE TABLE foo (id int);\n";
        let err = parse("x.sql", contents).unwrap_err();
        assert!(matches!(err, Error::ParseWrongOrder { .. }));
    }

    #[test]
    fn unexpected_statement_before_up_fails() {
        let contents = "CREATE TYPE foo AS ENUM ('a');\n-- migrate:up\nCREATE TABLE foo (id int);\n-- migrate:down\nDROP TABLE foo;\n";
        let err = parse("x.sql", contents).unwrap_err();
        assert!(matches!(err, Error::ParseUnexpectedStmt { .. }));
    }

    #[test]
    fn blank_and_comment_preamble_is_allowed() {
        let contents = "\n-- a helpful comment\n\n-- migrate:up\nCREATE TABLE foo (id int);\n-- migrate:down\nDROP TABLE foo;\n";
        assert!(parse("x.sql", contents).is_ok());
    }

    #[test]
    fn non_transactional_option_is_recognized() {
        let contents = "-- migrate:up transaction:false\nALTER TYPE foo ADD VALUE 'bar';\n-- migrate:down\nSELECT 1;\n";
        let parsed = parse("x.sql", contents).unwrap();
        assert!(!parsed.up_options.transaction());
        assert!(parsed.down_options.transaction());
    }

    #[test]
    fn unknown_options_are_ignored_silently() {
        let contents = "-- migrate:up foo:bar\nCREATE TABLE foo (id int);\n-- migrate:down\nDROP TABLE foo;\n";
        let parsed = parse("x.sql", contents).unwrap();
        assert_eq!(parsed.up_options.get("foo"), Some("bar"));
        assert!(parsed.up_options.transaction());
    }

    #[test]
    fn malformed_option_pairs_are_discarded() {
        let contents = "-- migrate:up weird\nCREATE TABLE foo (id int);\n-- migrate:down\nDROP TABLE foo;\n";
        let parsed = parse("x.sql", contents).unwrap();
        assert_eq!(parsed.up_options.get("weird"), None);
    }
}
