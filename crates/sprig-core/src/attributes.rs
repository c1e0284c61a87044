//! String serialization for attributes, class lists and inline styles.
//!
//! Output here is compared byte for byte against server-rendered markup, so
//! the quirks are load-bearing: `translate={false}` renders `no`, a class
//! toggle only strips whole tokens, and the style merger keeps comments
//! inside declarations untouched.

use std::fmt;

/// A dynamic attribute value as the template produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl AttrValue {
    fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Null => false,
            AttrValue::Bool(b) => *b,
            AttrValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AttrValue::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("null"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Number(n) => f.write_str(&number_to_string(*n)),
            AttrValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttrValue::Null, Into::into)
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Escapes `&` and `<`, plus `"` when `is_attr`.
pub fn escape_html(value: &str, is_attr: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' if is_attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn replacement(name: &str, value: &AttrValue) -> Option<&'static str> {
    match (name, value) {
        ("translate", AttrValue::Bool(true)) => Some("yes"),
        ("translate", AttrValue::Bool(false)) => Some("no"),
        _ => None,
    }
}

/// Renders ` name="value"`, ` name` for a truthy boolean attribute, or
/// nothing when the attribute should be omitted.
pub fn attr(name: &str, value: impl Into<AttrValue>, is_boolean: bool) -> String {
    let value = value.into();
    if value == AttrValue::Null
        || (!value.is_truthy() && is_boolean)
        || (value == AttrValue::Str(String::new()) && name == "class")
    {
        return String::new();
    }
    if is_boolean {
        return format!(" {name}");
    }
    let normalized = match replacement(name, &value) {
        Some(r) => r.to_string(),
        None => value.to_string(),
    };
    format!(" {name}=\"{}\"", escape_html(&normalized, true))
}

/// Input accepted by [`clsx`].
#[derive(Clone, Debug, PartialEq)]
pub enum ClassValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<ClassValue>),
    /// Toggle map, in insertion order.
    Map(Vec<(String, bool)>),
}

impl From<&str> for ClassValue {
    fn from(s: &str) -> Self {
        ClassValue::Str(s.to_string())
    }
}

impl ClassValue {
    fn is_truthy(&self) -> bool {
        match self {
            ClassValue::Null => false,
            ClassValue::Bool(b) => *b,
            ClassValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ClassValue::Str(s) => !s.is_empty(),
            ClassValue::List(_) | ClassValue::Map(_) => true,
        }
    }
}

fn flatten_class(value: &ClassValue) -> String {
    match value {
        ClassValue::Str(s) => s.clone(),
        ClassValue::Number(n) => number_to_string(*n),
        ClassValue::Null | ClassValue::Bool(_) => String::new(),
        ClassValue::List(items) => {
            let mut out = String::new();
            for item in items.iter().filter(|i| i.is_truthy()) {
                let part = flatten_class(item);
                if !part.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&part);
                }
            }
            out
        }
        ClassValue::Map(toggles) => {
            let mut out = String::new();
            for (key, on) in toggles {
                if *on {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(key);
                }
            }
            out
        }
    }
}

/// Lists and maps flatten the way the `clsx` package does; scalars pass
/// through unchanged (so `true` stays `"true"`), and null becomes empty.
pub fn clsx(value: &ClassValue) -> String {
    match value {
        ClassValue::Null => String::new(),
        ClassValue::Bool(b) => b.to_string(),
        ClassValue::List(_) | ClassValue::Map(_) => flatten_class(value),
        scalar => flatten_class(scalar),
    }
}

const CLASS_WHITESPACE: &[char] = &[
    ' ', '\t', '\n', '\r', '\u{c}', '\u{a0}', '\u{b}', '\u{feff}',
];

fn js_trim(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

fn is_class_boundary(c: Option<char>) -> bool {
    c.is_none_or(|c| CLASS_WHITESPACE.contains(&c))
}

/// Builds the final class string: the base class, then the scoping `hash`,
/// then every truthy toggle. A falsy toggle removes matching whole tokens.
/// Returns `None` when nothing is left.
pub fn to_class(
    class: Option<&str>,
    hash: Option<&str>,
    classes: Option<&[(String, bool)]>,
) -> Option<String> {
    let mut class_name = class.unwrap_or_default().to_string();
    if let Some(hash) = hash.filter(|h| !h.is_empty()) {
        if class_name.is_empty() {
            class_name = hash.to_string();
        } else {
            class_name.push(' ');
            class_name.push_str(hash);
        }
    }

    for (key, on) in classes.unwrap_or_default() {
        if *on {
            if class_name.is_empty() {
                class_name = key.clone();
            } else {
                class_name.push(' ');
                class_name.push_str(key);
            }
        } else if !class_name.is_empty() && !key.is_empty() {
            let mut start = 0;
            loop {
                while start < class_name.len() && !class_name.is_char_boundary(start) {
                    start += 1;
                }
                let Some(found) = class_name.get(start..).and_then(|rest| rest.find(key.as_str()))
                else {
                    break;
                };
                let at = start + found;
                let stop = at + key.len();
                let before = class_name[..at].chars().next_back();
                let after = class_name[stop..].chars().next();
                if is_class_boundary(before) && is_class_boundary(after) {
                    let left = js_trim(&class_name[..at]);
                    // resume where the right-hand part now begins
                    start = left.len();
                    class_name = js_trim(&format!("{} {}", left, js_trim(&class_name[stop..]))).to_string();
                } else {
                    start = stop;
                }
            }
        }
    }

    (!class_name.is_empty()).then_some(class_name)
}

/// Override tiers for [`to_style`]; each is in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleOverrides {
    pub normal: Vec<(String, String)>,
    pub important: Vec<(String, String)>,
}

impl StyleOverrides {
    pub fn normal(props: &[(&str, &str)]) -> Self {
        Self {
            normal: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            important: Vec::new(),
        }
    }

    pub fn with_important(mut self, props: &[(&str, &str)]) -> Self {
        self.important
            .extend(props.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    fn reserves(&self, name: &str) -> bool {
        self.normal
            .iter()
            .chain(self.important.iter())
            .any(|(k, _)| k == name)
    }
}

fn strip_comments(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(open) = rest.find("/*") {
        let Some(close) = rest[open + 2..].find("*/") else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(rest);
    out
}

/// Merges an inline style string with override declarations.
///
/// Declarations in `value` whose property is overridden are dropped; the
/// rest are kept verbatim (comments, quoted strings and parenthesized
/// arguments included). Overrides are appended, normal ones first, then
/// the `!important` tier. Without overrides the value passes through.
pub fn to_style(value: Option<&str>, styles: Option<&StyleOverrides>) -> Option<String> {
    let Some(styles) = styles else {
        return value.map(str::to_string);
    };

    let mut new_style = String::new();
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        let chars: Vec<char> = value.chars().collect();
        let len = chars.len();
        let slice = |from: usize, to: usize| -> String { chars[from..to.min(len)].iter().collect() };

        let mut in_str: Option<char> = None;
        let mut in_apo: i32 = 0;
        let mut in_comment = false;
        let mut start_index = 0usize;
        let mut name_index: Option<usize> = None;

        let mut i = 0usize;
        while i < len {
            let c = chars[i];
            if in_comment {
                if c == '/' && i > 0 && chars[i - 1] == '*' {
                    in_comment = false;
                }
            } else if let Some(q) = in_str {
                if q == c {
                    in_str = None;
                }
            } else if c == '/' && chars.get(i + 1) == Some(&'*') {
                in_comment = true;
            } else if c == '"' || c == '\'' {
                in_str = Some(c);
            } else if c == '(' {
                in_apo += 1;
            } else if c == ')' {
                in_apo -= 1;
            } else if in_apo == 0 {
                if c == ':' && name_index.is_none() {
                    name_index = Some(i);
                } else if c == ';' || i == len - 1 {
                    if let Some(ni) = name_index.filter(|ni| *ni > 0 && *ni < i) {
                        let mut name = js_trim(&slice(start_index, ni)).to_string();
                        if name.find("/*").is_some_and(|p| p > 0) {
                            name = js_trim(&strip_comments(&name)).to_string();
                        }
                        if !name.starts_with("--") {
                            name = name.to_lowercase();
                        }
                        if !styles.reserves(&name) {
                            if i == len - 1 {
                                i += 1;
                            }
                            let property = slice(start_index, i);
                            new_style.push_str(js_trim(&property));
                            new_style.push(';');
                        }
                    }
                    start_index = i + 1;
                    name_index = None;
                }
            }
            i += 1;
        }
    }

    for (key, val) in &styles.normal {
        new_style.push_str(&format!("{key}:{val};"));
    }
    for (key, val) in &styles.important {
        new_style.push_str(&format!("{key}:{val} !important;"));
    }
    Some(new_style)
}
