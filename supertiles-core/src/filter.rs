//! Feature predicates applied after tile extraction.

use serde_json::Value;

use crate::Properties;

/// Predicate deciding whether a feature is kept in its tile.
///
/// Any `Fn(&Properties) -> bool` closure that is `Send + Sync` is a filter.
///
/// ```
/// use serde_json::json;
/// use supertiles_core::{FeatureFilter, Properties};
///
/// let only_capitals = |props: &Properties| props.get("capital") == Some(&json!(true));
/// let mut props = Properties::new();
/// props.insert("capital".into(), json!(true));
/// assert!(only_capitals.keep(&props));
/// ```
pub trait FeatureFilter: Send + Sync {
    /// Return `true` to keep the feature.
    fn keep(&self, properties: &Properties) -> bool;
}

impl<F> FeatureFilter for F
where
    F: Fn(&Properties) -> bool + Send + Sync,
{
    fn keep(&self, properties: &Properties) -> bool {
        self(properties)
    }
}

/// Single comparison against one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyPredicate {
    /// The property is present and truthy.
    Truthy(String),
    /// The property equals the value.
    Equals(String, Value),
    /// The property is missing or differs from the value.
    NotEquals(String, Value),
}

impl PropertyPredicate {
    /// Parse `KEY`, `KEY=VALUE` or `KEY!=VALUE`.
    ///
    /// Values are read as JSON when possible (`3`, `true`, `"x"`), otherwise
    /// as plain strings.
    ///
    /// ```
    /// use serde_json::json;
    /// use supertiles_core::PropertyPredicate;
    ///
    /// assert_eq!(
    ///     PropertyPredicate::parse("scalerank=2"),
    ///     Some(PropertyPredicate::Equals("scalerank".into(), json!(2)))
    /// );
    /// assert_eq!(
    ///     PropertyPredicate::parse("region!=Europe"),
    ///     Some(PropertyPredicate::NotEquals("region".into(), json!("Europe")))
    /// );
    /// assert_eq!(PropertyPredicate::parse("=x"), None);
    /// ```
    #[must_use]
    pub fn parse(expression: &str) -> Option<Self> {
        let expression = expression.trim();
        if let Some((key, value)) = expression.split_once("!=") {
            return Self::key(key).map(|key| Self::NotEquals(key, parse_value(value)));
        }
        if let Some((key, value)) = expression.split_once('=') {
            return Self::key(key).map(|key| Self::Equals(key, parse_value(value)));
        }
        Self::key(expression).map(Self::Truthy)
    }

    fn key(raw: &str) -> Option<String> {
        let key = raw.trim();
        (!key.is_empty()).then(|| key.to_owned())
    }

    /// Evaluate the predicate.
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::Truthy(key) => properties.get(key).is_some_and(is_truthy),
            Self::Equals(key, value) => properties.get(key) == Some(value),
            Self::NotEquals(key, value) => properties.get(key) != Some(value),
        }
    }
}

fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Conjunction of property predicates; an empty set keeps everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    predicates: Vec<PropertyPredicate>,
}

impl PropertyFilter {
    /// Combine predicates with logical AND.
    #[must_use]
    pub const fn new(predicates: Vec<PropertyPredicate>) -> Self {
        Self { predicates }
    }

    /// Whether no predicates were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl FeatureFilter for PropertyFilter {
    fn keep(&self, properties: &Properties) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.matches(properties))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, found {other}"),
        }
    }

    #[rstest]
    #[case("capital", json!({"capital": true}), true)]
    #[case("capital", json!({"capital": false}), false)]
    #[case("capital", json!({"capital": 0}), false)]
    #[case("capital", json!({}), false)]
    #[case("name", json!({"name": ""}), false)]
    #[case("scalerank=2", json!({"scalerank": 2}), true)]
    #[case("scalerank=2", json!({"scalerank": 3}), false)]
    #[case("region=Europe", json!({"region": "Europe"}), true)]
    #[case("region!=Europe", json!({"region": "Asia"}), true)]
    #[case("region!=Europe", json!({}), true)]
    #[case("region!=Europe", json!({"region": "Europe"}), false)]
    fn predicate_evaluation(
        #[case] expression: &str,
        #[case] properties: Value,
        #[case] expected: bool,
    ) {
        let predicate = PropertyPredicate::parse(expression).expect("valid predicate");
        assert_eq!(predicate.matches(&props(properties)), expected);
    }

    #[rstest]
    #[case("")]
    #[case("  ")]
    #[case("=1")]
    #[case("!=1")]
    fn rejects_missing_key(#[case] expression: &str) {
        assert_eq!(PropertyPredicate::parse(expression), None);
    }

    #[rstest]
    fn filter_combines_with_and() {
        let filter = PropertyFilter::new(vec![
            PropertyPredicate::parse("capital").expect("predicate"),
            PropertyPredicate::parse("region=Europe").expect("predicate"),
        ]);
        assert!(filter.keep(&props(json!({"capital": true, "region": "Europe"}))));
        assert!(!filter.keep(&props(json!({"capital": true, "region": "Asia"}))));
    }

    #[rstest]
    fn empty_filter_keeps_everything() {
        let filter = PropertyFilter::default();
        assert!(filter.is_empty());
        assert!(filter.keep(&Properties::new()));
    }
}
