use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Threshold expressions attached to one metric, e.g. `http_req_duration: ["p(95)<2000"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    pub fn new<I, S>(metric: &str, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.to_string(),
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl ThresholdOp {
    const TOKENS: [(&'static str, ThresholdOp); 5] = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];

    pub fn holds(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
            Self::Eq => observed == expected,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Count,
    Rate,
    /// Percentile in (0, 100], e.g. `99.9`.
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.agg, self.op.token(), self.value)
    }
}

impl FromStr for ThresholdExpr {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        parse_threshold_expr(raw)
    }
}

fn invalid(raw: &str, reason: impl Into<String>) -> Error {
    Error::InvalidThreshold {
        expression: raw.to_string(),
        reason: reason.into(),
    }
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err(invalid(raw, "empty threshold"));
    }

    let (pos, token, op) = ThresholdOp::TOKENS
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, *tok, *op)))
        .ok_or_else(|| invalid(raw, "missing comparison operator"))?;

    let left = &s[..pos];
    let right = &s[pos + token.len()..];
    if left.is_empty() || right.is_empty() {
        return Err(invalid(raw, "expected `<aggregation><op><number>`"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| invalid(raw, format!("unknown aggregation `{left}`")))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| invalid(raw, "invalid percentile"))?;
            if !(p.is_finite() && p > 0.0 && p <= 100.0) {
                return Err(invalid(raw, "percentile out of range"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| invalid(raw, "invalid numeric value"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Source of aggregated observations a threshold can be checked against.
pub trait Observe {
    /// `None` when the metric is absent or the aggregation does not apply to it.
    fn observe(&self, metric: &str, agg: ThresholdAgg) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

impl ThresholdOutcome {
    /// `http_req_duration p(95)<2000`
    pub fn label(&self) -> String {
        format!("{} {}", self.metric, self.expression)
    }
}

/// Checks every expression of every set. A missing observation fails its expression.
pub fn evaluate_thresholds<O>(source: &O, sets: &[ThresholdSet]) -> Result<Vec<ThresholdOutcome>>
where
    O: Observe + ?Sized,
{
    let mut out = Vec::new();
    for set in sets {
        for raw in &set.expressions {
            let expr = parse_threshold_expr(raw)?;
            let observed = source.observe(&set.metric, expr.agg);
            out.push(ThresholdOutcome {
                metric: set.metric.clone(),
                expression: raw.trim().to_string(),
                observed,
                passed: observed.is_some_and(|v| expr.op.holds(v, expr.value)),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse_threshold_expr("  avg  <=  123  ").unwrap();
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_percentile_expression() {
        let expr: ThresholdExpr = "p(95)<2000".parse().unwrap();
        assert_eq!(expr.agg, ThresholdAgg::P(95.0));
        assert_eq!(expr.op, ThresholdOp::Lt);
        assert_eq!(expr.to_string(), "p(95)<2000");
    }

    #[test]
    fn parse_fractional_percentile() {
        let expr = parse_threshold_expr("p(99.9)<500").unwrap();
        assert_eq!(expr.agg, ThresholdAgg::P(99.9));
        assert_eq!(expr.to_string(), "p(99.9)<500");
        assert_eq!(
            parse_threshold_expr("p(100)<=1").unwrap().agg,
            ThresholdAgg::P(100.0)
        );
    }

    #[test]
    fn parse_rejects_bad_expressions() {
        for raw in [
            "", "p(101)<1", "p(0)<1", "p(-5)<1", "p(inf)<1", "p(x)<1", "median<5", "avg<", "avg 5",
        ] {
            assert!(
                matches!(
                    parse_threshold_expr(raw),
                    Err(Error::InvalidThreshold { .. })
                ),
                "expected `{raw}` to be rejected"
            );
        }
    }

    struct Fixed(HashMap<(&'static str, String), f64>);

    impl Observe for Fixed {
        fn observe(&self, metric: &str, agg: ThresholdAgg) -> Option<f64> {
            self.0
                .iter()
                .find(|((m, a), _)| *m == metric && *a == agg.to_string())
                .map(|(_, v)| *v)
        }
    }

    #[test]
    fn evaluate_marks_missing_metrics_as_failed() {
        let source = Fixed(HashMap::from([
            (("http_req_duration", "p(95)".to_string()), 120.0),
            (("http_req_duration", "p(99)".to_string()), 3500.0),
        ]));

        let sets = vec![
            ThresholdSet::new("http_req_duration", ["p(95)<2000", "p(99)<3000"]),
            ThresholdSet::new("checkout_duration", ["p(95)<2000", "p(99)<3000"]),
        ];
        let outcomes = evaluate_thresholds(&source, &sets).unwrap();
        let passed: Vec<(String, bool)> =
            outcomes.iter().map(|o| (o.label(), o.passed)).collect();

        assert_eq!(
            passed,
            vec![
                ("http_req_duration p(95)<2000".to_string(), true),
                ("http_req_duration p(99)<3000".to_string(), false),
                ("checkout_duration p(95)<2000".to_string(), false),
                ("checkout_duration p(99)<3000".to_string(), false),
            ]
        );
        assert_eq!(outcomes[2].observed, None);
    }
}
