//! Hidden markers identifying comments written by this tool.
//!
//! Three formats have been used over time. Only [`Marker::V3`] is written;
//! the older two are still recognized so their comments can be cleaned up.
//!
//! ```text
//! V1: <!-- created by ghprcomment -->
//! V2: <!-- ghprcomment TOKEN -->
//! V3: <!-- ghprcomment
//!     WORKFLOW NAME
//!     JOB NAME
//!     -->
//! ```

use std::{fmt, sync::OnceLock};

use regex::Regex;

/// Sentinel of the first marker format.
pub const V1_SENTINEL: &str = "<!-- created by ghprcomment -->";
/// Opening tag of the current marker block.
pub const MARKER_OPEN: &str = "<!-- ghprcomment";
/// Closing tag of the current marker block.
pub const MARKER_CLOSE: &str = "-->";

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Marker {
    V1,
    V2 { token: String },
    V3(CommentKey),
}

/// Identity of a current-format comment: which workflow's job it explains.
///
/// At most one live comment per key is kept on a pull request.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CommentKey {
    pub workflow_name: String,
    pub job_name: String,
}

impl CommentKey {
    pub fn new(workflow_name: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self { workflow_name: workflow_name.into(), job_name: job_name.into() }
    }
}

impl fmt::Display for CommentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_name, self.job_name)
    }
}

fn decode_v3(body: &str) -> Option<Marker> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| {
            Regex::new(
                r"<!-- ghprcomment\r?\n(?P<workflow>[^\r\n]+)\r?\n(?P<job>[^\r\n]+)\r?\n-->",
            )
            .unwrap()
        })
        .captures(body)?;
    Some(Marker::V3(CommentKey::new(&caps["workflow"], &caps["job"])))
}

fn decode_v2(body: &str) -> Option<Marker> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| Regex::new(r"<!-- ghprcomment (?P<token>\S+) -->").unwrap())
        .captures(body)?;
    Some(Marker::V2 { token: caps["token"].to_string() })
}

fn decode_v1(body: &str) -> Option<Marker> { body.contains(V1_SENTINEL).then_some(Marker::V1) }

/// Decodes the marker embedded in a comment body.
///
/// Formats are tried newest first, so a body carrying both a V3 block and
/// the V1 sentinel is classified as V3. `None` means the comment was not
/// written by this tool.
pub fn decode(body: &str) -> Option<Marker> {
    const DECODERS: [fn(&str) -> Option<Marker>; 3] = [decode_v3, decode_v2, decode_v1];
    DECODERS.iter().find_map(|decode| decode(body))
}

/// Renders a comment body in the current format.
/// Whether `value` can be written as the workflow or job line of a marker
/// block and decoded back.
pub fn is_encodable(value: &str) -> bool {
    !value.is_empty() && !value.contains(['\r', '\n'])
}

pub fn encode(workflow_name: &str, job_name: &str, message: &str) -> String {
    format!(
        "{}\n\n{MARKER_OPEN}\n{workflow_name}\n{job_name}\n{MARKER_CLOSE}\n",
        message.trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cases = [
            ("CI", "build", "Build failed, see logs"),
            ("Tests", "tests (ubuntu-latest, 21)", "Tests failed.\n\nPlease fix them.\n"),
            ("Check", "Checkstyle", ""),
            ("Ümlaut flow", "job with <!-- --> inside", "`code` and **bold**"),
        ];
        for (workflow, job, message) in cases {
            let body = encode(workflow, job, message);
            assert_eq!(decode(&body), Some(Marker::V3(CommentKey::new(workflow, job))), "{body}");
        }
    }

    #[test]
    fn test_is_encodable() {
        assert!(is_encodable("CI / Tests"));
        assert!(!is_encodable(""));
        assert!(!is_encodable("two\nlines"));
        assert!(!is_encodable("CI\r"));
        assert!(decode(&encode("", "lint", "Lint")).is_none());
    }

    #[test]
    fn test_encode_layout() {
        assert_eq!(
            encode("CI", "build", "Build failed\n"),
            "Build failed\n\n<!-- ghprcomment\nCI\nbuild\n-->\n"
        );
    }

    #[test]
    fn test_decode_legacy_formats() {
        assert_eq!(decode("Please fix\n\n<!-- created by ghprcomment -->"), Some(Marker::V1));
        assert_eq!(
            decode("Please fix\n\n<!-- ghprcomment build -->"),
            Some(Marker::V2 { token: "build".to_string() })
        );
    }

    #[test]
    fn test_decode_crlf() {
        assert_eq!(
            decode("Oops\r\n\r\n<!-- ghprcomment\r\nCI\r\nbuild\r\n-->\r\n"),
            Some(Marker::V3(CommentKey::new("CI", "build")))
        );
    }

    #[test]
    fn test_v3_wins_over_v1() {
        let body = format!("{}\n{V1_SENTINEL}", encode("CI", "lint", "Lint issues"));
        assert_eq!(decode(&body), Some(Marker::V3(CommentKey::new("CI", "lint"))));
    }

    #[test]
    fn test_not_a_marker() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("LGTM"), None);
        assert_eq!(decode("<!-- some other bot -->"), None);
        // Missing job line
        assert_eq!(decode("x\n\n<!-- ghprcomment\nCI\n-->"), None);
        // Empty payload lines
        assert_eq!(decode("x\n\n<!-- ghprcomment\n\n\n-->"), None);
    }

    #[test]
    fn test_malformed_v3_falls_back_to_v1() {
        let body = format!("x\n\n<!-- ghprcomment\nCI\n-->\n{V1_SENTINEL}");
        assert_eq!(decode(&body), Some(Marker::V1));
    }
}
