//! Natural-language request forms.
//!
//! A line that is not a JSON-RPC object may be one of a few fixed English
//! phrasings, e.g. `read the complete contents of the file '/tmp/x/a.txt'`.
//! Matching is case-insensitive and paths may be single- or double-quoted.

use std::sync::LazyLock;

use mcp::CallToolParams;
use regex::{Captures, Regex};
use serde_json::json;

/// A quoted or bare path, captured as `sq`, `dq` or `bare`.
const PATH: &str = r#"(?:'(?P<sq>[^']+)'|"(?P<dq>[^"]+)"|(?P<bare>\S+?))"#;

/// Optional trailing period and whitespace.
const END: &str = r"\s*\.?\s*$";

struct Phrase {
    pattern: Regex,
    build: fn(&Captures<'_>) -> Option<CallToolParams>,
}

static PHRASES: LazyLock<Vec<Phrase>> = LazyLock::new(|| {
    vec![
        Phrase {
            pattern: compile(&format!(
                r"(?is)^\s*read\s+(?:the\s+)?(?:(?:complete|full|entire)\s+)?contents?\s+of\s+(?:the\s+)?file:?\s*{PATH}{END}"
            )),
            build: |caps| Some(call("read_file", json!({ "path": path(caps)? }))),
        },
        Phrase {
            pattern: compile(&format!(
                r#"(?is)^\s*write\s+(?:'(?P<sc>.*)'|"(?P<dc>.*)")\s+to\s+(?:the\s+)?file:?\s*{PATH}{END}"#
            )),
            build: |caps| {
                let content = caps.name("sc").or_else(|| caps.name("dc"))?.as_str();
                Some(call(
                    "write_file",
                    json!({ "path": path(caps)?, "content": content }),
                ))
            },
        },
        Phrase {
            pattern: compile(&format!(
                r"(?i)^\s*(?:list|show)\s+(?:the\s+|all\s+)?allowed\s+directories{END}"
            )),
            build: |_| Some(CallToolParams::new("list_allowed_directories", None)),
        },
        Phrase {
            pattern: compile(&format!(
                r"(?is)^\s*list\s+(?:the\s+)?(?:contents\s+of\s+(?:the\s+)?)?directory:?\s*{PATH}{END}"
            )),
            build: |caps| Some(call("list_directory", json!({ "path": path(caps)? }))),
        },
    ]
});

/// Map a natural-language line to a tool call, if it matches a known form.
pub fn parse(text: &str) -> Option<CallToolParams> {
    PHRASES.iter().find_map(|phrase| {
        let caps = phrase.pattern.captures(text)?;
        (phrase.build)(&caps)
    })
}

fn compile(pattern: &str) -> Regex {
    // Patterns are literals; a failure here is a programming error caught by tests.
    Regex::new(pattern).expect("phrase pattern compiles")
}

fn path(caps: &Captures<'_>) -> Option<String> {
    caps.name("sq")
        .or_else(|| caps.name("dq"))
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str().to_string())
}

fn call(name: &str, arguments: serde_json::Value) -> CallToolParams {
    CallToolParams::new(name, Some(arguments))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(params: &CallToolParams, key: &str) -> String {
        params.arguments.as_ref().unwrap()[key]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn patterns_compile() {
        assert_eq!(PHRASES.len(), 4);
    }

    #[test]
    fn read_complete_contents() {
        let params = parse("read the complete contents of the file '/tmp/x/test.txt'").unwrap();
        assert_eq!(params.name, "read_file");
        assert_eq!(arg(&params, "path"), "/tmp/x/test.txt");
    }

    #[test]
    fn read_variants() {
        for text in [
            "Read the contents of file \"/tmp/x/test.txt\".",
            "read contents of the file: '/tmp/x/test.txt'",
            "READ THE FULL CONTENTS OF THE FILE /tmp/x/test.txt",
        ] {
            let params = parse(text).unwrap_or_else(|| panic!("no match: {text}"));
            assert_eq!(params.name, "read_file");
            assert_eq!(arg(&params, "path"), "/tmp/x/test.txt");
        }
    }

    #[test]
    fn write_content_to_file() {
        let params = parse("write 'New content' to the file '/tmp/x/output.txt'").unwrap();
        assert_eq!(params.name, "write_file");
        assert_eq!(arg(&params, "content"), "New content");
        assert_eq!(arg(&params, "path"), "/tmp/x/output.txt");
    }

    #[test]
    fn write_keeps_multiline_content() {
        let params = parse("write \"line one\nline two\" to file '/tmp/x/a.txt'").unwrap();
        assert_eq!(arg(&params, "content"), "line one\nline two");
    }

    #[test]
    fn list_allowed() {
        let params = parse("list allowed directories").unwrap();
        assert_eq!(params.name, "list_allowed_directories");
        assert!(params.arguments.is_none());
        assert!(parse("List the allowed directories.").is_some());
    }

    #[test]
    fn list_directory_contents() {
        let params = parse("list the contents of the directory '/tmp/x'").unwrap();
        assert_eq!(params.name, "list_directory");
        assert_eq!(arg(&params, "path"), "/tmp/x");
    }

    #[test]
    fn unrelated_text_does_not_match() {
        assert!(parse("hello there").is_none());
        assert!(parse("delete the file '/tmp/x/a.txt'").is_none());
        assert!(parse("").is_none());
    }
}
