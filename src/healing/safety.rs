//! Safety validation for generated data fixes.
//!
//! A DATA_FIX plan carries mutation text straight from the inference model.
//! Anything that drops, truncates, or touches every row of a table vetoes the
//! plan outright.

use crate::healing::types::{RemediationAction, RemediationPlan};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static DROP_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdrop\s+(?:table|index|database|schema)\b").unwrap());

static TRUNCATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btruncate\b").unwrap());

static DELETE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^delete\b|\bdelete\s+from\b").unwrap());

/// `UPDATE [ONLY] table [[AS] alias] SET`, or any statement opening with UPDATE.
static UPDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^update\b|\bupdate\s+(?:only\s+)?\S+(?:\s+(?:as\s+)?\w+)?\s+set\b").unwrap()
});

static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\bwhere\b(.*)$").unwrap());

static OR_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bor\b").unwrap());

static AND_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\band\b").unwrap());

static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^(?P<lhs>.+?)\s*(?P<op><>|!=|<=|>=|=|<|>|\s(?:not\s+)?(?:i?like|in|between)\s|\sis\s)\s*(?P<rhs>.+)$",
    )
    .unwrap()
});

static NULL_TEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<col>[a-z_][a-z0-9_.]*)\s+is\s+(?P<not>not\s+)?null$").unwrap()
});

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap());

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?:"[^"]+"|[a-z_][a-z0-9_]*)(?:\.(?:"[^"]+"|[a-z_][a-z0-9_]*))*$"#).unwrap()
});

/// The kinds of destructive intent the validator looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructiveKind {
    DropObject,
    Truncate,
    UnconditionalDelete,
    UnconditionalUpdate,
}

impl fmt::Display for DestructiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DestructiveKind::DropObject => "drop of a table, index, schema or database",
            DestructiveKind::Truncate => "table truncation",
            DestructiveKind::UnconditionalDelete => "delete without a row-limiting condition",
            DestructiveKind::UnconditionalUpdate => "update without a row-limiting condition",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestructiveFinding {
    pub kind: DestructiveKind,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SafetyVerdict {
    /// The plan has no mutation to inspect.
    NotApplicable,
    Safe,
    Unsafe(Vec<DestructiveFinding>),
}

impl SafetyVerdict {
    pub fn is_unsafe(&self) -> bool {
        matches!(self, SafetyVerdict::Unsafe(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Inspect a plan and veto it if its mutation is destructive.
    pub fn validate(&self, plan: &mut RemediationPlan) -> SafetyVerdict {
        if plan.action != RemediationAction::DataFix {
            return SafetyVerdict::NotApplicable;
        }
        let Some(mutation) = plan.mutation() else {
            return SafetyVerdict::NotApplicable;
        };

        let findings = self.scan(mutation);
        if findings.is_empty() {
            return SafetyVerdict::Safe;
        }

        let summary = findings
            .iter()
            .map(|f| f.kind.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        plan.veto(format!("destructive mutation: {}", summary));

        SafetyVerdict::Unsafe(findings)
    }

    /// Scan raw mutation text, statement by statement.
    pub fn scan(&self, mutation: &str) -> Vec<DestructiveFinding> {
        let mut findings = Vec::new();

        for statement in split_statements(mutation) {
            let mut push = |kind| {
                findings.push(DestructiveFinding {
                    kind,
                    statement: statement.to_string(),
                })
            };

            if DROP_OBJECT.is_match(statement) {
                push(DestructiveKind::DropObject);
            }
            if TRUNCATE.is_match(statement) {
                push(DestructiveKind::Truncate);
            }
            if DELETE.is_match(statement) && !has_limiting_condition(statement) {
                push(DestructiveKind::UnconditionalDelete);
            }
            if UPDATE.is_match(statement) && !has_limiting_condition(statement) {
                push(DestructiveKind::UnconditionalUpdate);
            }
        }

        findings
    }

    pub fn is_destructive(&self, mutation: &str) -> bool {
        !self.scan(mutation).is_empty()
    }
}

fn split_statements(text: &str) -> impl Iterator<Item = &str> {
    text.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// True when the statement has a WHERE clause that provably narrows the rows
/// it touches. A condition that cannot be read counts as matching every row.
fn has_limiting_condition(statement: &str) -> bool {
    let Some(caps) = WHERE_CLAUSE.captures(statement) else {
        return false;
    };
    let condition = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
    if condition.is_empty() || condition.contains("--") || condition.contains("/*") {
        return false;
    }

    let branches: Vec<&str> = OR_SPLIT.split(condition).map(trim_parens).collect();
    if null_tests_cover_every_row(&branches) {
        return false;
    }

    // Every OR branch needs at least one narrowing conjunct of its own.
    branches
        .iter()
        .all(|&branch| AND_SPLIT.split(branch).map(trim_parens).any(is_limiting_predicate))
}

fn trim_parens(text: &str) -> &str {
    text.trim().trim_start_matches('(').trim_end_matches(')').trim()
}

/// `col IS NULL OR col IS NOT NULL`
fn null_tests_cover_every_row(branches: &[&str]) -> bool {
    let tests: Vec<(String, bool)> = branches
        .iter()
        .filter_map(|branch| NULL_TEST.captures(branch))
        .map(|c| (c["col"].to_ascii_lowercase(), c.name("not").is_some()))
        .collect();
    tests
        .iter()
        .any(|(col, negated)| tests.iter().any(|(other, n)| other == col && n != negated))
}

fn is_limiting_predicate(predicate: &str) -> bool {
    let Some(caps) = COMPARISON.captures(predicate) else {
        return false;
    };
    let op = caps["op"].trim().to_ascii_lowercase();

    match (Operand::parse(&caps["lhs"]), Operand::parse(&caps["rhs"])) {
        (Operand::Column(a), Operand::Column(b)) => !a.eq_ignore_ascii_case(b),
        (Operand::Column(_), _) | (_, Operand::Column(_)) => true,
        // `1 = 2` and `'a' = 'b'` match nothing
        (Operand::Literal(a), Operand::Literal(b)) => op == "=" && a != b,
        _ => false,
    }
}

#[derive(Debug, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
    Keyword(String),
}

enum Operand<'a> {
    Column(&'a str),
    Literal(Literal),
    Other,
}

impl<'a> Operand<'a> {
    fn parse(text: &'a str) -> Self {
        let text = text.trim();
        if NUMBER.is_match(text) {
            return match text.parse() {
                Ok(n) => Operand::Literal(Literal::Number(n)),
                Err(_) => Operand::Other,
            };
        }

        let quoted = text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'');
        if quoted && !text[1..text.len() - 1].contains('\'') {
            return Operand::Literal(Literal::Text(text[1..text.len() - 1].to_lowercase()));
        }

        let lower = text.to_ascii_lowercase();
        if matches!(lower.as_str(), "true" | "false" | "null") {
            return Operand::Literal(Literal::Keyword(lower));
        }
        if IDENTIFIER.is_match(text) {
            return Operand::Column(text);
        }
        Operand::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healing::types::ActionPayload;

    fn data_fix(sql: &str, confidence: f64) -> RemediationPlan {
        RemediationPlan::new(RemediationAction::DataFix, "repair rows", confidence)
            .with_payload(ActionPayload::Mutation(sql.to_string()))
    }

    #[test]
    fn test_destructive_mutations_zero_confidence() {
        let validator = SafetyValidator::new();
        let cases = [
            "DROP TABLE loads",
            "drop index idx_loads_tenant",
            "DROP DATABASE fleet",
            "TRUNCATE drivers",
            "DELETE FROM loads WHERE 1=1",
            "delete from loads",
            "DELETE FROM loads WHERE tenant_id = 'T1' OR 1=1",
            "UPDATE trailers SET status = 'idle'",
            "update trailers set status = 'idle' where true",
            "UPDATE payroll SET amount = 0 WHERE 'a' = 'a'",
            "UPDATE loads SET rate = 0 WHERE id = id",
            "UPDATE loads SET status = 'open' WHERE id = 42; DROP TABLE customers",
            "DELETE FROM loads WHERE 1=1 AND 1=1",
            "DELETE FROM loads WHERE 1=1 OR id = 5",
            "DELETE FROM loads WHERE id = 5 OR 2=2",
            "DELETE FROM loads WHERE 2 > 1",
            "UPDATE loads l SET status = 'x'",
            "UPDATE loads AS l SET status = 'x' WHERE 1=1",
            "UPDATE ONLY loads SET status = 'x'",
            "DELETE FROM loads WHERE driver_id IS NULL OR driver_id IS NOT NULL",
            "DELETE FROM loads WHERE coalesce(id, 0) = coalesce(id, 0)",
            "DELETE FROM loads WHERE id = 5 -- scoped to one load",
        ];

        for sql in cases {
            let mut plan = data_fix(sql, 0.95);
            let verdict = validator.validate(&mut plan);
            assert!(verdict.is_unsafe(), "expected veto for {sql}");
            assert_eq!(plan.confidence(), 0.0, "confidence not zeroed for {sql}");
        }
    }

    #[test]
    fn test_targeted_mutations_pass() {
        let validator = SafetyValidator::new();
        let cases = [
            "UPDATE loads SET status = 'delivered' WHERE id = 1042 AND tenant_id = 'T1'",
            "DELETE FROM load_locks WHERE expires_at < now()",
            "INSERT INTO tenant_settings (tenant_id, key, value) VALUES ('T1', 'eld_sync', 'on')",
            "UPDATE drivers SET hos_cycle = '70/8' WHERE driver_id = 'D-17'",
            "DELETE FROM sessions WHERE 1 = 2",
            "UPDATE loads AS l SET status = 'x' WHERE l.id = 9",
            "UPDATE ONLY loads SET status = 'x' WHERE id IN (4, 5)",
            "DELETE FROM loads WHERE (tenant_id = 'T1' AND id = 5) OR (tenant_id = 'T2' AND id = 6)",
            "DELETE FROM loads WHERE status = 'void' AND 1=1",
        ];

        for sql in cases {
            let mut plan = data_fix(sql, 0.9);
            assert_eq!(validator.validate(&mut plan), SafetyVerdict::Safe, "false positive for {sql}");
            assert_eq!(plan.confidence(), 0.9);
        }
    }

    #[test]
    fn test_only_data_fix_is_inspected() {
        let validator = SafetyValidator::new();

        let mut plan = RemediationPlan::new(RemediationAction::CacheClear, "DROP TABLE in description", 0.9);
        assert_eq!(validator.validate(&mut plan), SafetyVerdict::NotApplicable);
        assert_eq!(plan.confidence(), 0.9);

        let mut bare = RemediationPlan::new(RemediationAction::DataFix, "no payload", 0.9);
        assert_eq!(validator.validate(&mut bare), SafetyVerdict::NotApplicable);
    }

    #[test]
    fn test_findings_name_the_statement() {
        let findings = SafetyValidator::new().scan("update loads set x = 1 where id = 3; truncate table drivers");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, DestructiveKind::Truncate);
        assert_eq!(findings[0].statement, "truncate table drivers");
    }
}
