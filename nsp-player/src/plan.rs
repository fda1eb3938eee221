//! Device group plans
//!
//! A plan is written as whitespace-separated device numbers. Bare numbers are
//! played one at a time; numbers inside parentheses are played together:
//!
//! ```
//! use nsp_player::plan::GroupPlan;
//!
//! let plan: GroupPlan = "1 2 (3 4) 5".parse().unwrap();
//! assert_eq!(plan.to_string(), "1 2 (3 4) 5");
//! assert_eq!(plan.len(), 4);
//! assert_eq!(plan.groups()[2].len(), 2);
//! ```
//!
//! Parsing is a two-stage tokenizer + state machine (`OutsideGroup` /
//! `InsideGroup`), so every malformed input is reported with the byte offset
//! where it went wrong.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Output device identifier as assigned by the audio driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Index form, for lookups in the host's device enumeration
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(value: u32) -> Self {
        DeviceId(value)
    }
}

/// Devices started together. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGroup {
    devices: Vec<DeviceId>,
}

impl DeviceGroup {
    /// Build a group; `None` when `devices` is empty.
    pub fn new(devices: Vec<DeviceId>) -> Option<Self> {
        if devices.is_empty() {
            None
        } else {
            Some(Self { devices })
        }
    }

    /// A group holding one device
    pub fn single(device: DeviceId) -> Self {
        Self {
            devices: vec![device],
        }
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl fmt::Display for DeviceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.devices.len() == 1 {
            return write!(f, "{}", self.devices[0]);
        }
        write!(f, "(")?;
        for (i, device) in self.devices.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", device)?;
        }
        write!(f, ")")
    }
}

/// Ordered groups: sequential across groups, parallel within one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    groups: Vec<DeviceGroup>,
}

impl GroupPlan {
    /// Parse a plan expression.
    ///
    /// # Errors
    /// `Error::MalformedPlan` on unbalanced or nested parentheses, empty
    /// groups, tokens that are not device numbers, or an empty expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let tokens = tokenize(expression)?;
        build_groups(&tokens)
    }

    /// Build a plan from pre-validated groups.
    ///
    /// # Errors
    /// `Error::MalformedPlan` when `groups` is empty.
    pub fn from_groups(groups: Vec<DeviceGroup>) -> Result<Self> {
        if groups.is_empty() {
            return Err(malformed(0, "plan contains no devices"));
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[DeviceGroup] {
        &self.groups
    }

    /// Number of sequential group steps
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false for a parsed plan.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every device in the plan, first appearance order, duplicates removed.
    pub fn unique_devices(&self) -> Vec<DeviceId> {
        let mut seen = Vec::new();
        for device in self.groups.iter().flat_map(|g| g.devices.iter()) {
            if !seen.contains(device) {
                seen.push(*device);
            }
        }
        seen
    }
}

impl FromStr for GroupPlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GroupPlan::parse(s)
    }
}

impl fmt::Display for GroupPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", group)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open(usize),
    Close(usize),
    Device(DeviceId, usize),
}

fn malformed(position: usize, reason: impl Into<String>) -> Error {
    Error::MalformedPlan {
        position,
        reason: reason.into(),
    }
}

/// Split on whitespace and parentheses; every word must be a device number.
fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    let flush = |start: Option<usize>, end: usize, tokens: &mut Vec<Token>| -> Result<()> {
        if let Some(start) = start {
            tokens.push(parse_device(&expression[start..end], start)?);
        }
        Ok(())
    };

    for (pos, ch) in expression.char_indices() {
        match ch {
            '(' | ')' => {
                flush(word_start.take(), pos, &mut tokens)?;
                tokens.push(if ch == '(' {
                    Token::Open(pos)
                } else {
                    Token::Close(pos)
                });
            }
            c if c.is_whitespace() => {
                flush(word_start.take(), pos, &mut tokens)?;
            }
            _ => {
                if word_start.is_none() {
                    word_start = Some(pos);
                }
            }
        }
    }
    flush(word_start.take(), expression.len(), &mut tokens)?;

    Ok(tokens)
}

fn parse_device(word: &str, position: usize) -> Result<Token> {
    if !word.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed(
            position,
            format!("expected a device number, found '{}'", word),
        ));
    }
    word.parse::<u32>()
        .map(|id| Token::Device(DeviceId(id), position))
        .map_err(|_| malformed(position, format!("device number '{}' out of range", word)))
}

enum ParseState {
    OutsideGroup,
    InsideGroup { opened_at: usize, members: Vec<DeviceId> },
}

fn build_groups(tokens: &[Token]) -> Result<GroupPlan> {
    let mut groups = Vec::new();
    let mut state = ParseState::OutsideGroup;

    for token in tokens {
        state = match (state, *token) {
            (ParseState::OutsideGroup, Token::Device(id, _)) => {
                groups.push(DeviceGroup::single(id));
                ParseState::OutsideGroup
            }
            (ParseState::OutsideGroup, Token::Open(pos)) => ParseState::InsideGroup {
                opened_at: pos,
                members: Vec::new(),
            },
            (ParseState::OutsideGroup, Token::Close(pos)) => {
                return Err(malformed(pos, "')' without matching '('"));
            }
            (ParseState::InsideGroup { opened_at, mut members }, Token::Device(id, _)) => {
                members.push(id);
                ParseState::InsideGroup { opened_at, members }
            }
            (ParseState::InsideGroup { opened_at, .. }, Token::Open(pos)) => {
                return Err(malformed(
                    pos,
                    format!("nested '(' inside the group opened at {}", opened_at),
                ));
            }
            (ParseState::InsideGroup { members, .. }, Token::Close(pos)) => {
                let group = DeviceGroup::new(members)
                    .ok_or_else(|| malformed(pos, "empty group '()'"))?;
                groups.push(group);
                ParseState::OutsideGroup
            }
        };
    }

    if let ParseState::InsideGroup { opened_at, .. } = state {
        return Err(malformed(opened_at, "'(' is never closed"));
    }

    GroupPlan::from_groups(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(plan: &GroupPlan) -> Vec<Vec<u32>> {
        plan.groups()
            .iter()
            .map(|g| g.devices().iter().map(|d| d.0).collect())
            .collect()
    }

    fn error_position(expression: &str) -> usize {
        match GroupPlan::parse(expression) {
            Err(Error::MalformedPlan { position, .. }) => position,
            other => panic!("Expected MalformedPlan for {:?}, got {:?}", expression, other),
        }
    }

    #[test]
    fn test_mixed_singletons_and_group() {
        let plan = GroupPlan::parse("1 2 (3 4) 5").unwrap();
        assert_eq!(ids(&plan), vec![vec![1], vec![2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_only_groups() {
        let plan = GroupPlan::parse("(1 2) (3 4)").unwrap();
        assert_eq!(ids(&plan), vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_only_singletons() {
        let plan = GroupPlan::parse("1 2 3").unwrap();
        assert_eq!(ids(&plan), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_alternating_runs() {
        let plan = GroupPlan::parse("0 (1 2) 3 4 (5 6 7) 8 (9 10)").unwrap();
        assert_eq!(
            ids(&plan),
            vec![
                vec![0],
                vec![1, 2],
                vec![3],
                vec![4],
                vec![5, 6, 7],
                vec![8],
                vec![9, 10]
            ]
        );
    }

    #[test]
    fn test_parentheses_need_no_surrounding_space() {
        let plan = GroupPlan::parse("1(2 3)4").unwrap();
        assert_eq!(ids(&plan), vec![vec![1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn test_whitespace_variants() {
        let plan = GroupPlan::parse("  7\t( 8\n9 )  ").unwrap();
        assert_eq!(ids(&plan), vec![vec![7], vec![8, 9]]);
    }

    #[test]
    fn test_parenthesized_single_device() {
        let plan = GroupPlan::parse("(3)").unwrap();
        assert_eq!(ids(&plan), vec![vec![3]]);
    }

    #[test]
    fn test_duplicates_across_groups_allowed() {
        let plan = GroupPlan::parse("1 (1 2) 2").unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.unique_devices(), vec![DeviceId(1), DeviceId(2)]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let expression = "4 (2 3) 1 (0 5)";
        let first = GroupPlan::parse(expression).unwrap();
        let second = GroupPlan::parse(expression).unwrap();
        assert_eq!(first, second);

        let reparsed = GroupPlan::parse(&first.to_string()).unwrap();
        assert_eq!(first, reparsed);
    }

    #[test]
    fn test_display_is_canonical() {
        let plan = GroupPlan::parse(" 1  (2   3)(4) ").unwrap();
        assert_eq!(plan.to_string(), "1 (2 3) 4");
    }

    #[test]
    fn test_unclosed_group() {
        assert_eq!(error_position("(1 2"), 0);
        assert_eq!(error_position("1 2 (3"), 4);
    }

    #[test]
    fn test_unmatched_close() {
        assert_eq!(error_position("1 2)"), 3);
        assert_eq!(error_position(")"), 0);
    }

    #[test]
    fn test_nested_group_rejected() {
        assert_eq!(error_position("(1 (2 3))"), 3);
    }

    #[test]
    fn test_empty_group_rejected() {
        assert_eq!(error_position("1 ()"), 3);
    }

    #[test]
    fn test_non_integer_tokens_rejected() {
        assert_eq!(error_position("1 two 3"), 2);
        assert_eq!(error_position("(1 2.5)"), 3);
        assert_eq!(error_position("-1"), 0);
    }

    #[test]
    fn test_out_of_range_device_rejected() {
        assert_eq!(error_position("1 99999999999"), 2);
    }

    #[test]
    fn test_empty_expression_rejected() {
        assert!(GroupPlan::parse("").is_err());
        assert!(GroupPlan::parse("   ").is_err());
    }

    #[test]
    fn test_from_str() {
        let plan: GroupPlan = "(0 1)".parse().unwrap();
        assert_eq!(plan.groups()[0].devices(), &[DeviceId(0), DeviceId(1)]);
    }
}
