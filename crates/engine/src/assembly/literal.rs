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

//! Literal synthesis: free-form input text to Java argument expressions.
//!
//! Values are not validated; a malformed number surfaces later as a
//! compilation error.

use std::collections::HashMap;

use super::ParameterSignature;

/// Turns textual input into one literal expression per parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralSynthesizer;

impl LiteralSynthesizer {
    /// Build argument expressions for `params` from the raw input blob.
    ///
    /// The blob is read as `name=value` pairs split on top-level commas. A single
    /// parameter without a pair of its own takes the whole trimmed blob.
    pub fn arguments(&self, params: &[ParameterSignature], raw: Option<&str>) -> Vec<String> {
        let raw = raw.unwrap_or_default();
        let named = named_pairs(raw);

        params
            .iter()
            .map(|param| {
                let value = match named.get(param.name.as_str()) {
                    Some(value) => *value,
                    None if params.len() == 1 => raw.trim(),
                    None => "",
                };
                self.literal(&param.declared_type, value)
            })
            .collect()
    }

    /// Build one literal of the declared type.
    pub fn literal(&self, declared_type: &str, raw: &str) -> String {
        let declared_type = declared_type.trim();
        let depth = declared_type.matches("[]").count();
        if depth > 0 {
            let base = declared_type.replace("[]", "");
            return self.array_literal(base.trim(), depth, raw);
        }
        if is_list_type(declared_type) {
            return self.list_literal(declared_type, raw);
        }
        scalar_literal(declared_type, raw)
    }

    fn array_literal(&self, base: &str, depth: usize, raw: &str) -> String {
        let dims = "[]".repeat(depth);
        let items: Vec<String> = split_elements(raw)
            .into_iter()
            .map(|element| match depth {
                1 => scalar_literal(base, element),
                _ => self.array_literal(base, depth - 1, element),
            })
            .collect();
        format!("new {base}{dims}{{{}}}", items.join(", "))
    }

    fn list_literal(&self, declared_type: &str, raw: &str) -> String {
        let element_type = match (declared_type.find('<'), declared_type.rfind('>')) {
            (Some(open), Some(close)) if close > open => declared_type[open + 1..close].trim(),
            _ => "Object",
        };
        let backing =
            if declared_type.starts_with("LinkedList") { "LinkedList" } else { "ArrayList" };

        let items: Vec<String> =
            split_elements(raw).into_iter().map(|element| self.literal(element_type, element)).collect();
        if items.is_empty() {
            format!("new java.util.{backing}<>()")
        } else {
            format!("new java.util.{backing}<>(java.util.Arrays.asList({}))", items.join(", "))
        }
    }
}

fn is_list_type(declared_type: &str) -> bool {
    let simple = declared_type.strip_prefix("java.util.").unwrap_or(declared_type);
    ["List", "ArrayList", "LinkedList"].iter().any(|list| {
        simple.strip_prefix(list).is_some_and(|rest| rest.is_empty() || rest.starts_with('<'))
    })
}

fn scalar_literal(declared_type: &str, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return zero_value(declared_type).to_string();
    }

    match declared_type {
        "int" | "Integer" => value.to_string(),
        "long" | "Long" if is_integral(value) => format!("{value}L"),
        "float" | "Float" if is_numeric(value) => format!("{value}f"),
        "double" | "Double" if is_integral(value) => format!("{value}.0"),
        "short" | "Short" | "byte" | "Byte" if is_integral(value) => {
            format!("({}) {value}", declared_type.to_ascii_lowercase())
        }
        "boolean" | "Boolean" => value.to_lowercase(),
        "char" | "Character" => char_literal(value),
        "String" | "CharSequence" => string_literal(value),
        _ => value.to_string(),
    }
}

fn zero_value(declared_type: &str) -> &'static str {
    match declared_type {
        "int" | "long" | "short" | "byte" => "0",
        "double" => "0.0",
        "float" => "0.0f",
        "boolean" => "false",
        "char" => "'\\u0000'",
        "String" | "CharSequence" => "\"\"",
        _ => "null",
    }
}

fn is_integral(value: &str) -> bool {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_numeric(value: &str) -> bool {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    digits.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

fn char_literal(value: &str) -> String {
    if value.starts_with('\'') {
        return value.to_string();
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some('\\'), _) => format!("'{value}'"),
        (Some('\''), None) => "'\\''".to_string(),
        (Some(c), None) => format!("'{c}'"),
        _ => value.to_string(),
    }
}

fn string_literal(value: &str) -> String {
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            value.strip_prefix(*quote).and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(value);

    let mut literal = String::with_capacity(unquoted.len() + 2);
    literal.push('"');
    let mut escaped = false;
    for c in unquoted.chars() {
        if c == '"' && !escaped {
            literal.push('\\');
        }
        escaped = c == '\\' && !escaped;
        literal.push(c);
    }
    if escaped {
        literal.push('\\');
    }
    literal.push('"');
    literal
}

/// `name=value` pairs from top-level comma-separated parts.
fn named_pairs(raw: &str) -> HashMap<&str, &str> {
    split_top_level(raw)
        .into_iter()
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name, value.trim()))
        })
        .collect()
}

/// Elements of a list-like value, with one layer of surrounding brackets removed.
fn split_elements(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    split_top_level(inner)
}

/// Split on commas outside brackets and quotes, dropping empty parts.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in raw.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' => quote = Some(c),
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(raw[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(raw[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(declared_type: &str, name: &str) -> ParameterSignature {
        ParameterSignature { declared_type: declared_type.into(), name: name.into() }
    }

    #[test]
    fn test_scalars_pass_through() {
        let synth = LiteralSynthesizer;
        assert_eq!(synth.literal("int", "42"), "42");
        assert_eq!(synth.literal("boolean", "TRUE"), "true");
        assert_eq!(synth.literal("long", "7"), "7L");
        assert_eq!(synth.literal("double", "2"), "2.0");
        assert_eq!(synth.literal("double", "2.5"), "2.5");
        assert_eq!(synth.literal("float", "1.5"), "1.5f");
        assert_eq!(synth.literal("short", "3"), "(short) 3");
        assert_eq!(synth.literal("char", "x"), "'x'");
        assert_eq!(synth.literal("TreeNode", "root"), "root");
    }

    #[test]
    fn test_zero_values() {
        let synth = LiteralSynthesizer;
        assert_eq!(synth.literal("int", "  "), "0");
        assert_eq!(synth.literal("double", ""), "0.0");
        assert_eq!(synth.literal("boolean", ""), "false");
        assert_eq!(synth.literal("String", ""), "\"\"");
        assert_eq!(synth.literal("char", ""), "'\\u0000'");
        assert_eq!(synth.literal("Integer", ""), "null");
    }

    #[test]
    fn test_string_quoting() {
        let synth = LiteralSynthesizer;
        assert_eq!(synth.literal("String", "hello"), "\"hello\"");
        assert_eq!(synth.literal("String", "\"hello\""), "\"hello\"");
        assert_eq!(synth.literal("String", "'hi'"), "\"hi\"");
        assert_eq!(synth.literal("String", "say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(synth.literal("String", "a\\\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_nested_arrays() {
        let synth = LiteralSynthesizer;
        assert_eq!(synth.literal("int[][]", "[[1,2],[3]]"), "new int[][]{new int[]{1, 2}, new int[]{3}}");
        assert_eq!(synth.literal("int[]", ""), "new int[]{}");
        assert_eq!(synth.literal("int[][]", "[]"), "new int[][]{}");
        assert_eq!(synth.literal("String[]", "[a, \"b,c\"]"), "new String[]{\"a\", \"b,c\"}");
    }

    #[test]
    fn test_lists_recurse_through_element_types() {
        let synth = LiteralSynthesizer;
        assert_eq!(
            synth.literal("List<Integer>", "[1, 2]"),
            "new java.util.ArrayList<>(java.util.Arrays.asList(1, 2))"
        );
        assert_eq!(synth.literal("LinkedList<String>", "[]"), "new java.util.LinkedList<>()");
        assert_eq!(
            synth.literal("List<List<Integer>>", "[[1],[2,3]]"),
            "new java.util.ArrayList<>(java.util.Arrays.asList(\
             new java.util.ArrayList<>(java.util.Arrays.asList(1)), \
             new java.util.ArrayList<>(java.util.Arrays.asList(2, 3))))"
        );
        assert_eq!(
            synth.literal("List<int[]>", "[[1,2]]"),
            "new java.util.ArrayList<>(java.util.Arrays.asList(new int[]{1, 2}))"
        );
        assert_eq!(synth.literal("List", "[x]"), "new java.util.ArrayList<>(java.util.Arrays.asList(x))");
    }

    #[test]
    fn test_named_pairs_and_single_parameter_fallback() {
        let synth = LiteralSynthesizer;
        let params = [param("int", "a"), param("int", "b")];
        assert_eq!(synth.arguments(&params, Some("a=2, b=3")), vec!["2", "3"]);
        assert_eq!(synth.arguments(&params, Some("b=3")), vec!["0", "3"]);
        assert_eq!(synth.arguments(&params, None), vec!["0", "0"]);

        let single = [param("int[]", "nums")];
        assert_eq!(synth.arguments(&single, Some(" [4, 5] ")), vec!["new int[]{4, 5}"]);
        assert_eq!(synth.arguments(&single, Some("nums=[1]")), vec!["new int[]{1}"]);
        assert_eq!(synth.arguments(&[param("String", "s")], Some("k=v")), vec!["\"k=v\""]);
        assert!(synth.arguments(&[], Some("x=1")).is_empty());
    }
}
