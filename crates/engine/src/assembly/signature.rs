// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Best-effort structural detection over Java source text.
//!
//! This is a heuristic scanner, not a grammar. Known gaps: nested and inner
//! types are not distinguished from top-level ones, generic types nest at most
//! two angle-bracket levels, and an annotation sharing a line with the
//! modifiers hides the method from detection.

use regex::Regex;
use std::sync::OnceLock;

use crate::AssemblyError;

/// Name of the process entry method
pub const ENTRY_METHOD: &str = "main";

/// Words that can sit in the return-type position of the method pattern without
/// starting a declaration.
const NON_TYPE_WORDS: &[&str] = &[
    "new", "return", "throw", "throws", "else", "case", "assert", "yield", "goto", "package",
    "import", "instanceof", "record", "public", "private", "protected", "static", "final",
    "abstract", "synchronized", "native", "default",
];

/// Words that can sit in the name position without being a method name.
const NON_METHOD_NAMES: &[&str] =
    &["if", "for", "while", "switch", "catch", "synchronized", "try", "return", "super", "this"];

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSignature {
    /// Declared type with generics and array markers, e.g. `List<Integer>` or `int[][]`
    pub declared_type: String,
    /// Parameter name
    pub name: String,
}

/// A method detected in the snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Declared return type
    pub return_type: String,
    /// Method name
    pub name: String,
    /// Parameters in declaration order
    pub params: Vec<ParameterSignature>,
    /// Byte offset of the declaration in the source
    pub offset: usize,
}

impl MethodSignature {
    /// Whether the method returns nothing.
    pub fn is_void(&self) -> bool {
        self.return_type == "void"
    }
}

/// A `class` declaration found in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    /// Declared class name
    pub name: String,
    /// Byte offset of the `class` keyword
    pub offset: usize,
    /// Whether the declaration is `public`
    pub public: bool,
}

struct SourcePatterns {
    class_decl: Regex,
    public_prefix: Regex,
    entry_point: Regex,
    method: Regex,
}

fn patterns() -> &'static SourcePatterns {
    static PATTERNS: OnceLock<SourcePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let ty = r"[A-Za-z_$][\w$.]*(?:\s*<(?:[^<>()]|<[^<>()]*>)*>)?(?:\s*\[\s*\])*";
        SourcePatterns {
            class_decl: Regex::new(r"\bclass\s+([A-Za-z_$][\w$]*)").unwrap(),
            public_prefix: Regex::new(r"\bpublic\s+(?:(?:final|abstract|static|sealed|strictfp)\s+)*$")
                .unwrap(),
            entry_point: Regex::new(r"\bstatic\s+void\s+main\s*\(").unwrap(),
            method: Regex::new(&format!(
                r"(?m)(?:^|[;{{}}])\s*(?:(?:public|private|protected|static|final|synchronized|abstract|native|strictfp)\s+)*(?:<[^<>()]*>\s+)?({ty})\s+([A-Za-z_$][\w$]*)\s*\(([^)]*)\)"
            ))
            .unwrap(),
        }
    })
}

/// Replace comments with whitespace, keeping line breaks and byte offsets intact.
pub fn strip_comments(code: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Lex {
        Code,
        LineComment,
        BlockComment,
        Literal(char),
    }

    fn blank(out: &mut String, c: char) {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat_n(' ', c.len_utf8()));
        }
    }

    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    let mut state = Lex::Code;

    while let Some(c) = chars.next() {
        match state {
            Lex::Code => match (c, chars.peek().copied()) {
                ('/', Some('/')) => {
                    chars.next();
                    out.push_str("  ");
                    state = Lex::LineComment;
                }
                ('/', Some('*')) => {
                    chars.next();
                    out.push_str("  ");
                    state = Lex::BlockComment;
                }
                ('"' | '\'', _) => {
                    out.push(c);
                    state = Lex::Literal(c);
                }
                _ => out.push(c),
            },
            Lex::LineComment => {
                blank(&mut out, c);
                if c == '\n' {
                    state = Lex::Code;
                }
            }
            Lex::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = Lex::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            Lex::Literal(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote || c == '\n' {
                    state = Lex::Code;
                }
            }
        }
    }

    out
}

/// All `class` declarations in textual order.
pub fn find_classes(source: &str) -> Vec<ClassDecl> {
    let patterns = patterns();
    patterns
        .class_decl
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let public = patterns.public_prefix.is_match(&source[..whole.start()]);
            Some(ClassDecl { name, offset: whole.start(), public })
        })
        .collect()
}

/// Byte offset of a `static void main(` declaration, if any.
pub fn find_entry_point(source: &str) -> Option<usize> {
    patterns().entry_point.find(source).map(|m| m.start())
}

/// The first method declaration that is not the process entry point.
///
/// First match wins; there is no ranking between candidates.
pub fn find_method(source: &str) -> Result<Option<MethodSignature>, AssemblyError> {
    for caps in patterns().method.captures_iter(source) {
        let (Some(ty), Some(name), Some(params)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            continue;
        };
        let return_type = normalize_type(ty.as_str());
        let name = name.as_str();

        if NON_TYPE_WORDS.contains(&return_type.as_str()) || NON_METHOD_NAMES.contains(&name) {
            continue;
        }
        if name == ENTRY_METHOD {
            continue;
        }

        let params = parse_parameters(name, params.as_str())?;
        return Ok(Some(MethodSignature {
            return_type,
            name: name.to_string(),
            params,
            offset: ty.start(),
        }));
    }
    Ok(None)
}

/// Split a parameter list into typed parameters.
pub fn parse_parameters(method: &str, blob: &str) -> Result<Vec<ParameterSignature>, AssemblyError> {
    let mut params = Vec::new();

    for declaration in split_declarations(blob) {
        let tokens: Vec<&str> = declaration
            .split_whitespace()
            .filter(|token| *token != "final" && !token.starts_with('@'))
            .collect();

        let Some((name, type_tokens)) = tokens.split_last().filter(|(_, rest)| !rest.is_empty()) else {
            return Err(AssemblyError::MalformedParameter {
                method: method.to_string(),
                parameter: declaration.to_string(),
            });
        };

        let mut declared_type = normalize_type(&type_tokens.join(" "));
        let mut name = *name;

        if let Some(stripped) = name.strip_prefix("...") {
            declared_type.push_str("...");
            name = stripped;
        }
        let leading = name.len() - name.trim_start_matches(['[', ']']).len();
        declared_type.push_str(&name[..leading]);
        name = &name[leading..];
        if let Some(bracket) = name.find('[') {
            declared_type.push_str(&name[bracket..].replace(char::is_whitespace, ""));
            name = &name[..bracket];
        }
        if let Some(element) = declared_type.strip_suffix("...") {
            declared_type = format!("{}[]", element.trim_end());
        }

        params.push(ParameterSignature { declared_type, name: name.to_string() });
    }

    Ok(params)
}

/// Split on commas that are outside `<>` and `[]`.
fn split_declarations(blob: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (idx, c) in blob.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(blob[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(blob[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Collapse whitespace inside a type so `int [ ]` reads `int[]`.
fn normalize_type(ty: &str) -> String {
    let joined = ty.split_whitespace().collect::<Vec<_>>().join(" ");
    joined.replace(" [", "[").replace("[ ", "[").replace(" ]", "]").replace(" <", "<").replace(" ...", "...")
}
