//! Parsing of assistant replies.
//!
//! Two things are pulled out of a finished reply:
//! - fenced code blocks, offered to the user as new files
//! - inline `[ACTION: kind: argument]` directives, dispatched when agent
//!   actions are enabled
//!
//! This is a text-pattern matcher, not a sandbox: a directive that appears
//! inside quoted or fenced text is still a directive.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

#[allow(clippy::expect_used)]
static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[ACTION:\s*([A-Za-z0-9_]+):\s*(.+?)\]").expect("directive pattern is valid")
});

#[allow(clippy::expect_used)]
static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```").expect("fence pattern is valid")
});

/// Blocks this short (after trimming) are not worth offering as a file.
const MIN_BLOCK_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    RunCommand,
    CreateFile,
    InsertAtCursor,
}

impl ActionKind {
    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "run_command" => Some(Self::RunCommand),
            "create_file" => Some(Self::CreateFile),
            "insert_at_cursor" => Some(Self::InsertAtCursor),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RunCommand => "run_command",
            Self::CreateFile => "create_file",
            Self::InsertAtCursor => "insert_at_cursor",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: ActionKind,
    /// Raw text after the second colon, up to the closing bracket.
    pub argument: String,
}

/// `create_file` argument split into path and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFileArgs {
    pub path: String,
    pub content: String,
}

impl Directive {
    /// Split at the first colon; later colons stay in the content.
    /// `None` when there is no colon.
    pub fn create_file_args(&self) -> Option<CreateFileArgs> {
        let (path, content) = self.argument.split_once(':')?;
        Some(CreateFileArgs {
            path: path.trim().to_string(),
            content: content.trim().to_string(),
        })
    }
}

/// Every directive in order of appearance. Unknown kinds are dropped.
pub fn parse_directives(reply: &str) -> Vec<Directive> {
    DIRECTIVE_RE
        .captures_iter(reply)
        .filter_map(|caps| {
            let ident = &caps[1];
            match ActionKind::from_ident(ident) {
                Some(kind) => Some(Directive {
                    kind,
                    argument: caps[2].to_string(),
                }),
                None => {
                    debug!(kind = ident, "Ignoring unknown action directive");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub extension: &'static str,
    /// Trimmed block body.
    pub content: String,
}

impl CodeBlock {
    pub fn default_file_name(&self) -> String {
        format!("index.{}", self.extension)
    }
}

pub fn extension_for(language: Option<&str>) -> &'static str {
    match language.map(str::to_ascii_lowercase).as_deref() {
        Some("html") => "html",
        Some("js" | "javascript") => "js",
        Some("ts" | "typescript") => "ts",
        Some("css") => "css",
        Some("py" | "python") => "py",
        Some("json") => "json",
        _ => "txt",
    }
}

/// Fenced blocks with more than a trivial amount of content.
pub fn extract_code_blocks(reply: &str) -> Vec<CodeBlock> {
    FENCE_RE
        .captures_iter(reply)
        .filter_map(|caps| {
            let content = caps[2].trim();
            if content.chars().count() <= MIN_BLOCK_CHARS {
                return None;
            }
            let language = Some(&caps[1]).filter(|l| !l.is_empty()).map(str::to_string);
            Some(CodeBlock {
                extension: extension_for(language.as_deref()),
                language,
                content: content.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_block_maps_to_py() {
        let reply = "Here you go:\n```python\nprint('hi there')\n```\nDone.";
        let blocks = extract_code_blocks(reply);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[0].extension, "py");
        assert_eq!(blocks[0].content, "print('hi there')");
        assert_eq!(blocks[0].default_file_name(), "index.py");
    }

    #[test]
    fn test_short_block_dropped() {
        assert!(extract_code_blocks("```js\nx = 1\n```").is_empty());
        // Exactly ten characters is still too short.
        assert!(extract_code_blocks("```\n0123456789\n```").is_empty());
        assert_eq!(extract_code_blocks("```\n0123456789a\n```").len(), 1);
    }

    #[test]
    fn test_multiple_blocks_and_unknown_language() {
        let reply = "```html\n<p>hello world</p>\n```\ntext\n```rust\nfn main() { }\n```\n```\nplain text block\n```";
        let blocks = extract_code_blocks(reply);
        let exts: Vec<_> = blocks.iter().map(|b| b.extension).collect();
        assert_eq!(exts, ["html", "txt", "txt"]);
        assert_eq!(blocks[2].language, None);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for(Some("JavaScript")), "js");
        assert_eq!(extension_for(Some("ts")), "ts");
        assert_eq!(extension_for(Some("css")), "css");
        assert_eq!(extension_for(Some("json")), "json");
        assert_eq!(extension_for(None), "txt");
    }

    #[test]
    fn test_create_file_directive() {
        let directives = parse_directives("Sure. [ACTION: create_file: foo.txt: hello]");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].kind, ActionKind::CreateFile);
        let args = directives[0].create_file_args().unwrap();
        assert_eq!(args.path, "foo.txt");
        assert_eq!(args.content, "hello");
    }

    #[test]
    fn test_create_file_content_keeps_later_colons() {
        let directive = Directive {
            kind: ActionKind::CreateFile,
            argument: "a.json: {\"k\": 1}".into(),
        };
        assert_eq!(directive.create_file_args().unwrap().content, "{\"k\": 1}");

        let no_colon = Directive {
            kind: ActionKind::CreateFile,
            argument: "just-a-path".into(),
        };
        assert_eq!(no_colon.create_file_args(), None);
    }

    #[test]
    fn test_directives_in_order() {
        let reply = "[ACTION: run_command: ls -la]\nthen [ACTION:insert_at_cursor:  // note ]";
        let directives = parse_directives(reply);
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].kind, ActionKind::RunCommand);
        assert_eq!(directives[0].argument, "ls -la");
        assert_eq!(directives[1].kind, ActionKind::InsertAtCursor);
        assert_eq!(directives[1].argument.trim(), "// note");
    }

    #[test]
    fn test_malformed_and_unknown_directives() {
        assert!(parse_directives("[ACTION: run_command ls]").is_empty());
        assert!(parse_directives("[ACTION: run_command: ls").is_empty());
        assert!(parse_directives("[ACTION: delete_everything: /]").is_empty());
    }
}
