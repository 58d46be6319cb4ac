//! Compound selector parsing for the in-memory host.
//!
//! Supported: type, `*`, `#id`, `.class`, attribute conditions (`[a]`, `=`, `^=`, `$=`,
//! `*=`, `~=`), the `:first-child`, `:last-child`, `:only-child`, `:empty`, `:focus` and
//! `:not(..)` pseudo-classes, the four combinators and comma-separated groups.

use std::collections::HashMap;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectorAttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    StartsWith { key: String, value: String },
    EndsWith { key: String, value: String },
    Contains { key: String, value: String },
    Includes { key: String, value: String },
}

impl SelectorAttrCondition {
    fn key(&self) -> &str {
        match self {
            Self::Exists { key }
            | Self::Eq { key, .. }
            | Self::StartsWith { key, .. }
            | Self::EndsWith { key, .. }
            | Self::Contains { key, .. }
            | Self::Includes { key, .. } => key,
        }
    }

    pub(crate) fn matches(&self, attrs: &HashMap<String, String>) -> bool {
        let Some(actual) = attrs.get(self.key()) else {
            return false;
        };
        match self {
            Self::Exists { .. } => true,
            Self::Eq { value, .. } => actual == value,
            Self::StartsWith { value, .. } => actual.starts_with(value.as_str()),
            Self::EndsWith { value, .. } => actual.ends_with(value.as_str()),
            Self::Contains { value, .. } => actual.contains(value.as_str()),
            Self::Includes { value, .. } => actual.split_whitespace().any(|token| token == value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectorPseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    Empty,
    Focus,
    Not(Vec<Vec<SelectorPart>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SelectorStep {
    pub(crate) tag: Option<String>,
    pub(crate) universal: bool,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<SelectorAttrCondition>,
    pub(crate) pseudo_classes: Vec<SelectorPseudoClass>,
}

impl SelectorStep {
    pub(crate) fn id_only(&self) -> Option<&str> {
        if !self.universal
            && self.tag.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudo_classes.is_empty()
        {
            self.id.as_deref()
        } else {
            None
        }
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && !self.universal
            && self.pseudo_classes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectorCombinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorPart {
    pub(crate) step: SelectorStep,
    // Relation to the part on the left.
    pub(crate) combinator: Option<SelectorCombinator>,
}

pub(crate) fn parse_selector_groups(selector: &str) -> Result<Vec<Vec<SelectorPart>>> {
    split_selector_groups(selector)?
        .iter()
        .map(|group| parse_selector_chain(group))
        .collect()
}

fn parse_selector_chain(selector: &str) -> Result<Vec<SelectorPart>> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }

    let mut steps = Vec::new();
    let mut pending_combinator: Option<SelectorCombinator> = None;

    for token in tokenize_selector(selector)? {
        let combinator = match token.as_str() {
            ">" => Some(SelectorCombinator::Child),
            "+" => Some(SelectorCombinator::AdjacentSibling),
            "~" => Some(SelectorCombinator::GeneralSibling),
            _ => None,
        };
        if let Some(combinator) = combinator {
            if pending_combinator.is_some() || steps.is_empty() {
                return Err(Error::UnsupportedSelector(selector.into()));
            }
            pending_combinator = Some(combinator);
            continue;
        }

        let step = parse_selector_step(&token)?;
        let combinator = if steps.is_empty() {
            None
        } else {
            Some(
                pending_combinator
                    .take()
                    .unwrap_or(SelectorCombinator::Descendant),
            )
        };
        steps.push(SelectorPart { step, combinator });
    }

    if steps.is_empty() || pending_combinator.is_some() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    Ok(steps)
}

/// Tracks `[]`/`()` nesting so separators inside them are left alone.
#[derive(Default)]
struct Nesting {
    brackets: usize,
    parens: usize,
}

impl Nesting {
    fn track(&mut self, ch: char, selector: &str) -> Result<()> {
        let unbalanced = || Error::UnsupportedSelector(selector.into());
        match ch {
            '[' => self.brackets += 1,
            ']' => self.brackets = self.brackets.checked_sub(1).ok_or_else(unbalanced)?,
            '(' => self.parens += 1,
            ')' => self.parens = self.parens.checked_sub(1).ok_or_else(unbalanced)?,
            _ => {}
        }
        Ok(())
    }

    fn is_top_level(&self) -> bool {
        self.brackets == 0 && self.parens == 0
    }
}

fn split_selector_groups(selector: &str) -> Result<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    for ch in selector.chars() {
        if ch == ',' && nesting.is_top_level() {
            let trimmed = current.trim();
            if trimmed.is_empty() {
                return Err(Error::UnsupportedSelector(selector.into()));
            }
            groups.push(trimmed.to_string());
            current.clear();
            continue;
        }
        nesting.track(ch, selector)?;
        current.push(ch);
    }

    let trimmed = current.trim();
    if !nesting.is_top_level() || trimmed.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    groups.push(trimmed.to_string());
    Ok(groups)
}

fn tokenize_selector(selector: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.trim().is_empty() {
            tokens.push(current.trim().to_string());
        }
        current.clear();
    };

    for ch in selector.chars() {
        if nesting.is_top_level() {
            if matches!(ch, '>' | '+' | '~') {
                flush(&mut current, &mut tokens);
                tokens.push(ch.to_string());
                continue;
            }
            if ch.is_ascii_whitespace() {
                flush(&mut current, &mut tokens);
                continue;
            }
        }
        nesting.track(ch, selector)?;
        current.push(ch);
    }

    if !nesting.is_top_level() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }
    flush(&mut current, &mut tokens);
    Ok(tokens)
}

fn parse_selector_step(part: &str) -> Result<SelectorStep> {
    let part = part.trim();
    let unsupported = || Error::UnsupportedSelector(part.into());
    let bytes = part.as_bytes();
    let mut i = 0usize;
    let mut step = SelectorStep::default();

    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if step.universal || step.tag.is_some() || i != 0 {
                    return Err(unsupported());
                }
                step.universal = true;
                i += 1;
            }
            b'#' => {
                let (id, next) = parse_selector_ident(part, i + 1).ok_or_else(unsupported)?;
                if step.id.replace(id).is_some() {
                    return Err(unsupported());
                }
                i = next;
            }
            b'.' => {
                let (class_name, next) =
                    parse_selector_ident(part, i + 1).ok_or_else(unsupported)?;
                step.classes.push(class_name);
                i = next;
            }
            b'[' => {
                let (attr, next) = parse_selector_attr_condition(part, i)?;
                step.attrs.push(attr);
                i = next;
            }
            b':' => {
                let (pseudo, next) = parse_selector_pseudo(part, i)?;
                step.pseudo_classes.push(pseudo);
                i = next;
            }
            _ => {
                if i != 0 {
                    return Err(unsupported());
                }
                let (tag, next) = parse_selector_ident(part, i).ok_or_else(unsupported)?;
                step.tag = Some(tag);
                i = next;
            }
        }
    }

    if step.is_empty() {
        return Err(unsupported());
    }
    Ok(step)
}

fn parse_selector_pseudo(part: &str, colon: usize) -> Result<(SelectorPseudoClass, usize)> {
    let unsupported = || Error::UnsupportedSelector(part.into());
    let start = colon + 1;
    let (name, mut next) = parse_selector_ident(part, start).ok_or_else(unsupported)?;

    let pseudo = match name.as_str() {
        "first-child" => SelectorPseudoClass::FirstChild,
        "last-child" => SelectorPseudoClass::LastChild,
        "only-child" => SelectorPseudoClass::OnlyChild,
        "empty" => SelectorPseudoClass::Empty,
        "focus" => SelectorPseudoClass::Focus,
        "not" => {
            let body_start = next + 1;
            if part.as_bytes().get(next) != Some(&b'(') {
                return Err(unsupported());
            }
            let close = find_matching_paren(&part[body_start..]).ok_or_else(unsupported)?;
            let inners = parse_selector_groups(&part[body_start..body_start + close])?;
            next = body_start + close + 1;
            SelectorPseudoClass::Not(inners)
        }
        _ => return Err(unsupported()),
    };
    Ok((pseudo, next))
}

fn find_matching_paren(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(idx),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn parse_selector_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    if start >= bytes.len() || !is_selector_ident_char(bytes[start]) {
        return None;
    }
    let mut end = start + 1;
    while end < bytes.len() && is_selector_ident_char(bytes[end]) {
        end += 1;
    }
    Some((src.get(start..end)?.to_string(), end))
}

fn is_selector_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn parse_selector_attr_condition(
    src: &str,
    open_bracket: usize,
) -> Result<(SelectorAttrCondition, usize)> {
    let unsupported = || Error::UnsupportedSelector(src.into());
    let bytes = src.as_bytes();
    let close = src[open_bracket..]
        .find(']')
        .map(|offset| open_bracket + offset)
        .ok_or_else(unsupported)?;
    let body = src[open_bracket + 1..close].trim();

    let operators = [("^=", 0u8), ("$=", 1), ("*=", 2), ("~=", 3), ("=", 4)];
    let split = operators
        .iter()
        .find_map(|(op, kind)| body.find(op).map(|pos| (pos, op.len(), *kind)));

    let condition = match split {
        None => {
            let key = body.to_ascii_lowercase();
            if key.is_empty() || !key.bytes().all(|b| is_selector_ident_char(b) || b == b':') {
                return Err(unsupported());
            }
            SelectorAttrCondition::Exists { key }
        }
        Some((pos, op_len, kind)) => {
            let key = body[..pos].trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(unsupported());
            }
            let raw = body[pos + op_len..].trim();
            let value = raw
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .or_else(|| raw.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')))
                .unwrap_or(raw)
                .to_string();
            match kind {
                0 => SelectorAttrCondition::StartsWith { key, value },
                1 => SelectorAttrCondition::EndsWith { key, value },
                2 => SelectorAttrCondition::Contains { key, value },
                3 => SelectorAttrCondition::Includes { key, value },
                _ => SelectorAttrCondition::Eq { key, value },
            }
        }
    };

    debug_assert_eq!(bytes[close], b']');
    Ok((condition, close + 1))
}
