//! Matcher verdict parsing
//!
//! The matcher prints progress freely and its verdict on the last non-empty
//! line of stdout: a media file name, or the `None` sentinel.

/// Literal the matcher prints when nothing matched
pub const NO_MATCH_SENTINEL: &str = "None";

/// Verdict extracted from a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Matched(String),
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("matcher produced no output")]
    EmptyOutput,
}

/// Take the last non-empty line of `stdout` as the verdict.
///
/// The file name is not checked against the media directory.
pub fn parse_verdict(stdout: &str) -> Result<Verdict, ParseError> {
    let token = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .ok_or(ParseError::EmptyOutput)?;

    if token == NO_MATCH_SENTINEL {
        Ok(Verdict::NoMatch)
    } else {
        Ok(Verdict::Matched(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line_is_verdict() {
        let out = "loading stickers...\nscore logo1=0.3\nsong.mid\n";
        assert_eq!(
            parse_verdict(out),
            Ok(Verdict::Matched("song.mid".to_string()))
        );
    }

    #[test]
    fn test_none_sentinel() {
        assert_eq!(parse_verdict("scoring...\nNone\n"), Ok(Verdict::NoMatch));
    }

    #[test]
    fn test_sentinel_is_case_sensitive() {
        assert_eq!(
            parse_verdict("none\n"),
            Ok(Verdict::Matched("none".to_string()))
        );
    }

    #[test]
    fn test_trailing_blank_lines_and_crlf() {
        let out = "progress\r\nkb3.mid\r\n\r\n   \n";
        assert_eq!(
            parse_verdict(out),
            Ok(Verdict::Matched("kb3.mid".to_string()))
        );
    }

    #[test]
    fn test_empty_output_is_not_no_match() {
        assert_eq!(parse_verdict(""), Err(ParseError::EmptyOutput));
        assert_eq!(parse_verdict("\n\n  \n"), Err(ParseError::EmptyOutput));
    }
}
