//! Choice evaluation.
//!
//! Rules are tried in declaration order and the first one whose conditions
//! all hold wins. Evaluation reads the context and nothing else, so the same
//! context always yields the same branch.

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::workflow::{ChoiceRule, ChoiceState, Condition, ContextPath, Operator};

/// Which branch a Choice state took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceOutcome {
    /// A rule matched.
    Matched { rule: usize, next: String },
    /// No rule matched; the default was taken.
    Default { next: String },
}

impl ChoiceOutcome {
    pub fn next(&self) -> &str {
        match self {
            ChoiceOutcome::Matched { next, .. } | ChoiceOutcome::Default { next } => next,
        }
    }
}

/// Evaluates Choice states against an execution context.
#[derive(Debug, Clone, Default)]
pub struct ChoiceEvaluator;

impl ChoiceEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Pick the next state for a Choice.
    ///
    /// Fails with [`EngineError::ChoiceNoMatch`] when no rule matches and the
    /// state declares no default.
    pub fn evaluate(
        &self,
        state_name: &str,
        choice: &ChoiceState,
        ctx: &Value,
    ) -> EngineResult<ChoiceOutcome> {
        for (index, rule) in choice.choices.iter().enumerate() {
            if self.evaluate_rule(rule, ctx)? {
                tracing::debug!(state = %state_name, rule = index, next = %rule.next, "Choice rule matched");
                return Ok(ChoiceOutcome::Matched {
                    rule: index,
                    next: rule.next.clone(),
                });
            }
        }

        match &choice.default {
            Some(next) => {
                tracing::debug!(state = %state_name, next = %next, "No choice rule matched, taking default");
                Ok(ChoiceOutcome::Default { next: next.clone() })
            }
            None => Err(EngineError::ChoiceNoMatch(state_name.to_string())),
        }
    }

    /// Evaluate a rule (AND of its conditions).
    pub fn evaluate_rule(&self, rule: &ChoiceRule, ctx: &Value) -> EngineResult<bool> {
        for condition in &rule.when {
            if !self.evaluate_condition(condition, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate a single condition.
    pub fn evaluate_condition(&self, condition: &Condition, ctx: &Value) -> EngineResult<bool> {
        let path = ContextPath::parse(&condition.variable)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let left = path.get(ctx);
        let right = condition.value.as_ref();

        let matched = match condition.op {
            Operator::Eq => matches!((left, right), (Some(l), Some(r)) if l == r),
            Operator::Ne => !matches!((left, right), (Some(l), Some(r)) if l == r),
            Operator::Gt => compare_numeric(left, right, |a, b| a > b),
            Operator::Lt => compare_numeric(left, right, |a, b| a < b),
            Operator::Gte => compare_numeric(left, right, |a, b| a >= b),
            Operator::Lte => compare_numeric(left, right, |a, b| a <= b),
            Operator::Contains => match (left, right) {
                (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
            Operator::Matches => {
                let pattern = right.and_then(|r| r.as_str()).ok_or_else(|| {
                    EngineError::Validation(format!(
                        "matches on '{}' needs a string pattern",
                        condition.variable
                    ))
                })?;
                let re = regex::Regex::new(pattern)
                    .map_err(|e| EngineError::Validation(format!("Invalid regex: {}", e)))?;
                left.and_then(|l| l.as_str()).is_some_and(|s| re.is_match(s))
            }
            Operator::Truthy => left.is_some_and(is_truthy),
            Operator::Falsy => !left.is_some_and(is_truthy),
            Operator::Present => left.is_some(),
            Operator::Absent => left.is_none(),
            Operator::In => match (left, right) {
                (Some(l), Some(Value::Array(items))) => items.contains(l),
                _ => false,
            },
            Operator::NotIn => match (left, right) {
                (Some(l), Some(Value::Array(items))) => !items.contains(l),
                _ => true,
            },
        };

        Ok(matched)
    }
}

/// Check if a JSON value is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Values that cannot be read as numbers never satisfy a comparison.
fn compare_numeric<F>(left: Option<&Value>, right: Option<&Value>, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left.and_then(value_to_f64), right.and_then(value_to_f64)) {
        (Some(l), Some(r)) => cmp(l, r),
        _ => false,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(conditions: Vec<Condition>, next: &str) -> ChoiceRule {
        ChoiceRule {
            when: conditions,
            next: next.to_string(),
        }
    }

    fn check_subject() -> ChoiceState {
        ChoiceState {
            choices: vec![rule(
                vec![Condition::eq("$.subjectFlag", json!(true))],
                "UpdateAccountAssignment",
            )],
            default: Some("DetectInvoice".to_string()),
        }
    }

    fn attachment_type() -> ChoiceState {
        ChoiceState {
            choices: vec![
                rule(vec![Condition::eq("$.type", json!("pdf"))], "ProcessPdf"),
                rule(vec![Condition::eq("$.type", json!("excel"))], "ProcessExcel"),
                rule(vec![Condition::eq("$.type", json!("doc"))], "ProcessDoc"),
            ],
            default: Some("ProcessEmailBody".to_string()),
        }
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("hello")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!([1])));
    }

    #[test]
    fn test_subject_flag_routing() {
        let evaluator = ChoiceEvaluator::new();
        let state = check_subject();

        let outcome = evaluator
            .evaluate("CheckSubject", &state, &json!({"subjectFlag": true}))
            .unwrap();
        assert_eq!(
            outcome,
            ChoiceOutcome::Matched {
                rule: 0,
                next: "UpdateAccountAssignment".to_string()
            }
        );

        let outcome = evaluator
            .evaluate("CheckSubject", &state, &json!({"subjectFlag": false}))
            .unwrap();
        assert_eq!(outcome.next(), "DetectInvoice");
        assert!(matches!(outcome, ChoiceOutcome::Default { .. }));
    }

    #[test]
    fn test_attachment_type_dispatch() {
        let evaluator = ChoiceEvaluator::new();
        let state = attachment_type();

        for (kind, expected) in [
            ("pdf", "ProcessPdf"),
            ("excel", "ProcessExcel"),
            ("doc", "ProcessDoc"),
            ("other", "ProcessEmailBody"),
        ] {
            let outcome = evaluator
                .evaluate("RouteAttachment", &state, &json!({"type": kind}))
                .unwrap();
            assert_eq!(outcome.next(), expected, "type {}", kind);
        }
    }

    #[test]
    fn test_first_match_wins() {
        let evaluator = ChoiceEvaluator::new();
        let state = ChoiceState {
            choices: vec![
                rule(vec![Condition::present("$.attachments[0]")], "First"),
                rule(vec![Condition::present("$.attachments")], "Second"),
            ],
            default: None,
        };

        let ctx = json!({"attachments": [{"type": "pdf"}]});
        assert_eq!(evaluator.evaluate("S", &state, &ctx).unwrap().next(), "First");

        let ctx = json!({"attachments": []});
        assert_eq!(evaluator.evaluate("S", &state, &ctx).unwrap().next(), "Second");
    }

    #[test]
    fn test_no_match_without_default() {
        let evaluator = ChoiceEvaluator::new();
        let state = ChoiceState {
            choices: vec![rule(vec![Condition::present("$.attachments[0]")], "Process")],
            default: None,
        };

        let err = evaluator
            .evaluate("CheckAttachments", &state, &json!({"attachments": []}))
            .unwrap_err();
        assert!(matches!(err, EngineError::ChoiceNoMatch(ref s) if s == "CheckAttachments"));
        assert_eq!(err.code(), "ChoiceNoMatchError");
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let evaluator = ChoiceEvaluator::new();
        let state = attachment_type();
        let ctx = json!({"type": "excel", "filename": "q3.xlsx"});

        let first = evaluator.evaluate("Route", &state, &ctx).unwrap();
        let second = evaluator.evaluate("Route", &state, &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_operators() {
        let evaluator = ChoiceEvaluator::new();
        let ctx = json!({
            "count": 10,
            "amount": "12.50",
            "subject": "RE: UPDATED ACCOUNT ASSIGNMENTS",
            "tags": ["urgent", "invoice"],
            "empty": null
        });
        let check = |c: Condition| evaluator.evaluate_condition(&c, &ctx).unwrap();

        assert!(check(Condition::new("$.count", Operator::Gt, Some(json!(5)))));
        assert!(check(Condition::new("$.amount", Operator::Lte, Some(json!(12.5)))));
        assert!(!check(Condition::new("$.subject", Operator::Gt, Some(json!(1)))));
        assert!(check(Condition::new(
            "$.subject",
            Operator::Contains,
            Some(json!("UPDATED ACCOUNT ASSIGNMENTS"))
        )));
        assert!(check(Condition::new("$.tags", Operator::Contains, Some(json!("invoice")))));
        assert!(check(Condition::new("$.subject", Operator::Matches, Some(json!("^RE:")))));
        assert!(check(Condition::new("$.count", Operator::In, Some(json!([1, 10])))));
        assert!(check(Condition::new("$.count", Operator::NotIn, Some(json!([1, 2])))));
        assert!(check(Condition::new("$.missing", Operator::Ne, Some(json!(1)))));
        assert!(!check(Condition::new("$.missing", Operator::Eq, Some(Value::Null))));
        assert!(check(Condition::new("$.empty", Operator::Present, None)));
        assert!(check(Condition::new("$.empty", Operator::Falsy, None)));
        assert!(check(Condition::new("$.missing", Operator::Absent, None)));
        assert!(!check(Condition::new("$.missing", Operator::Truthy, None)));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let evaluator = ChoiceEvaluator::new();
        let both = rule(
            vec![
                Condition::eq("$.type", json!("pdf")),
                Condition::present("$.filename"),
            ],
            "X",
        );
        assert!(evaluator
            .evaluate_rule(&both, &json!({"type": "pdf", "filename": "a.pdf"}))
            .unwrap());
        assert!(!evaluator.evaluate_rule(&both, &json!({"type": "pdf"})).unwrap());
    }
}
