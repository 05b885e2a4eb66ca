use std::fmt;
use std::str::FromStr;

use maplabel_core::label::HideTarget;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::sequence::CommandId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HideKind {
    TextComponent,
    SymbolComponent,
    TextObject,
    StackLevel,
}

impl HideKind {
    fn keyword(self) -> &'static str {
        match self {
            HideKind::TextComponent => "TC",
            HideKind::SymbolComponent => "SC",
            HideKind::TextObject => "TO",
            HideKind::StackLevel => "L",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "TC" => Some(HideKind::TextComponent),
            "SC" => Some(HideKind::SymbolComponent),
            "TO" => Some(HideKind::TextObject),
            "L" => Some(HideKind::StackLevel),
            _ => None,
        }
    }
}

/// 同一种元素的一组引用，如 `TC(a,b)`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideGroup {
    pub kind: HideKind,
    pub targets: Vec<HideTarget>,
}

/// 一次隐藏尝试：以 `&` 连接的若干组，需同时隐藏。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideAttempt {
    pub groups: Vec<HideGroup>,
}

impl HideAttempt {
    pub fn targets(&self) -> impl Iterator<Item = &HideTarget> {
        self.groups.iter().flat_map(|group| group.targets.iter())
    }
}

/// 按声明顺序排列的隐藏尝试集合。
///
/// 文法：
///
/// ```text
/// hides   := attempt (',' attempt)*
/// attempt := group ('&' group)*
/// group   := ('TC' | 'SC' | 'TO') '(' name (',' name)* ')'
///          | 'L' '(' level (',' level)* ')'
/// ```
///
/// 记号两侧的空白会被忽略，名称内部允许空格。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideAttempts {
    attempts: Vec<HideAttempt>,
}

impl HideAttempts {
    pub fn new(attempts: Vec<HideAttempt>) -> Self {
        Self { attempts }
    }

    pub fn parse(text: &str) -> Result<Self, EngineError> {
        Parser::new(text).parse()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HideAttempt> {
        self.attempts.iter()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&HideAttempt> {
        self.attempts.get(index)
    }
}

impl FromStr for HideAttempts {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HideAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, attempt) in self.attempts.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            for (group_index, group) in attempt.groups.iter().enumerate() {
                if group_index > 0 {
                    f.write_str("&")?;
                }
                write!(f, "{}(", group.kind.keyword())?;
                for (target_index, target) in group.targets.iter().enumerate() {
                    if target_index > 0 {
                        f.write_str(",")?;
                    }
                    match target {
                        HideTarget::TextComponent(name)
                        | HideTarget::SymbolComponent(name)
                        | HideTarget::TextObject(name) => f.write_str(name)?,
                        HideTarget::StackLevel(level) => write!(f, "{level}")?,
                    }
                }
                f.write_str(")")?;
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    offset: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, offset: 0 }
    }

    fn parse(mut self) -> Result<HideAttempts, EngineError> {
        let mut attempts = Vec::new();
        loop {
            attempts.push(self.parse_attempt()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => self.bump(),
                Some(other) => {
                    return Err(self.error(format!("expected ',' or end of input, found '{other}'")));
                }
            }
        }
        Ok(HideAttempts::new(attempts))
    }

    fn parse_attempt(&mut self) -> Result<HideAttempt, EngineError> {
        let mut groups = vec![self.parse_group()?];
        loop {
            self.skip_whitespace();
            if self.peek() != Some('&') {
                break;
            }
            self.bump();
            groups.push(self.parse_group()?);
        }
        Ok(HideAttempt { groups })
    }

    fn parse_group(&mut self) -> Result<HideGroup, EngineError> {
        self.skip_whitespace();
        let start = self.offset;
        while self.peek().is_some_and(|ch| ch.is_ascii_alphabetic()) {
            self.bump();
        }
        let keyword = &self.input[start..self.offset];
        if keyword.is_empty() {
            return Err(self.error("expected element kind (TC, SC, TO or L)"));
        }
        let kind = HideKind::from_keyword(keyword).ok_or_else(|| EngineError::ParseError {
            offset: start,
            message: format!("unknown element kind '{keyword}'"),
        })?;

        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(self.error("expected '('"));
        }
        self.bump();

        let mut targets = Vec::new();
        loop {
            targets.push(self.parse_item(kind)?);
            match self.peek() {
                Some(',') => self.bump(),
                Some(')') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error("unterminated element group")),
            }
        }
        Ok(HideGroup { kind, targets })
    }

    // 读取到 ',' 或 ')' 为止，游标停在分隔符上。
    fn parse_item(&mut self, kind: HideKind) -> Result<HideTarget, EngineError> {
        let start = self.offset;
        while let Some(ch) = self.peek() {
            match ch {
                ',' | ')' => break,
                '(' | '&' => {
                    return Err(self.error(format!("unexpected '{ch}' in element name")));
                }
                _ => self.bump(),
            }
        }
        if self.peek().is_none() {
            return Err(self.error("unterminated element group"));
        }
        let raw = &self.input[start..self.offset];
        let name = raw.trim();
        let name_offset = start + (raw.len() - raw.trim_start().len());
        if name.is_empty() {
            return Err(EngineError::ParseError {
                offset: name_offset,
                message: "empty element name".to_string(),
            });
        }
        let target = match kind {
            HideKind::TextComponent => HideTarget::TextComponent(name.to_string()),
            HideKind::SymbolComponent => HideTarget::SymbolComponent(name.to_string()),
            HideKind::TextObject => HideTarget::TextObject(name.to_string()),
            HideKind::StackLevel => match name.parse::<u32>() {
                Ok(level) if level > 0 => HideTarget::StackLevel(level),
                _ => {
                    return Err(EngineError::ParseError {
                        offset: name_offset,
                        message: format!("invalid stack level '{name}'"),
                    });
                }
            },
        };
        Ok(target)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    #[inline]
    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.offset += ch.len_utf8();
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::ParseError {
            offset: self.offset,
            message: message.into(),
        }
    }
}

/// 依次尝试隐藏注记元素，直到注记放得下。
///
/// 堆叠层 `L(n)` 针对当前的堆叠结果：每次堆叠或取消堆叠都会清空已隐藏的层。
/// 因此按层隐藏只应放在堆叠循环之前；若堆叠循环位于本循环体内，
/// 或本指令排在堆叠循环之后（其结束时已取消堆叠），按层隐藏不会生效。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HideCommand {
    attempts: HideAttempts,
    pub(crate) where_to_loop: Option<CommandId>,
}

impl HideCommand {
    pub fn new(attempts: HideAttempts) -> Result<Self, EngineError> {
        if attempts.is_empty() {
            return Err(EngineError::CommandInitializedWithNullHideAttempts);
        }
        Ok(Self {
            attempts,
            where_to_loop: None,
        })
    }

    pub fn parse(text: &str) -> Result<Self, EngineError> {
        Self::new(HideAttempts::parse(text)?)
    }

    /// 重新解析参数；失败时保留原有的尝试集合。
    pub fn parse_parameters(&mut self, text: &str) -> Result<(), EngineError> {
        self.attempts = HideAttempts::parse(text)?;
        Ok(())
    }

    #[inline]
    pub fn attempts(&self) -> &HideAttempts {
        &self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_attempt_with_two_groups() {
        let attempts = HideAttempts::parse("TC(name1,name2) & SC(name3)").unwrap();
        assert_eq!(attempts.len(), 1);
        let attempt = attempts.get(0).unwrap();
        assert_eq!(attempt.groups.len(), 2);
        assert_eq!(attempt.groups[0].kind, HideKind::TextComponent);
        assert_eq!(
            attempt.groups[0].targets,
            vec![
                HideTarget::TextComponent("name1".to_string()),
                HideTarget::TextComponent("name2".to_string()),
            ]
        );
        assert_eq!(attempt.groups[1].kind, HideKind::SymbolComponent);
        assert_eq!(
            attempt.groups[1].targets,
            vec![HideTarget::SymbolComponent("name3".to_string())]
        );
    }

    #[test]
    fn top_level_commas_separate_attempts() {
        let attempts: HideAttempts = " to(Sub Title) , l(2, 3)&TC(x) ".parse().unwrap();
        assert_eq!(attempts.len(), 2);
        let first: Vec<_> = attempts.get(0).unwrap().targets().cloned().collect();
        assert_eq!(first, vec![HideTarget::TextObject("Sub Title".to_string())]);
        let second: Vec<_> = attempts.get(1).unwrap().targets().cloned().collect();
        assert_eq!(
            second,
            vec![
                HideTarget::StackLevel(2),
                HideTarget::StackLevel(3),
                HideTarget::TextComponent("x".to_string()),
            ]
        );
        assert_eq!(attempts.to_string(), "TO(Sub Title),L(2,3)&TC(x)");
    }

    #[test]
    fn malformed_input_reports_offsets() {
        let cases = [
            ("TC(", 3),
            ("", 0),
            ("XX(a)", 0),
            ("TC a", 3),
            ("TC(a,)", 5),
            ("L(0)", 2),
            ("TC(a) SC(b)", 6),
            ("TC(a)&", 6),
            ("TC(a(b))", 4),
        ];
        for (text, expected) in cases {
            match HideAttempts::parse(text) {
                Err(EngineError::ParseError { offset, .. }) => {
                    assert_eq!(offset, expected, "input {text:?}")
                }
                other => panic!("input {text:?} parsed unexpectedly: {other:?}"),
            }
        }
    }

    #[test]
    fn command_rejects_empty_attempts() {
        let err = HideCommand::new(HideAttempts::default()).unwrap_err();
        assert_eq!(err, EngineError::CommandInitializedWithNullHideAttempts);
    }

    #[test]
    fn parse_parameters_keeps_previous_value_on_error() {
        let mut command = HideCommand::parse("SC(shield)").unwrap();
        assert!(command.parse_parameters("TC(").is_err());
        assert_eq!(command.attempts().to_string(), "SC(shield)");
        command.parse_parameters("TC(a),TC(b)").unwrap();
        assert_eq!(command.attempts().len(), 2);
    }
}
