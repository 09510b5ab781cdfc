//! Aggregation of point properties into cluster properties.

use serde_json::{Number, Value};
use supertiles_core::Properties;

/// Strategy combining the properties of clustered points.
///
/// When [`ClusterProperties::aggregates`] is `true`, each new cluster starts
/// from the mapped properties of its first member and every further member is
/// folded in with [`ClusterProperties::reduce`]. Clusters of clusters reduce
/// the already-reduced properties of their children.
pub trait ClusterProperties: Send + Sync {
    /// Whether clusters carry aggregated properties at all.
    fn aggregates(&self) -> bool {
        true
    }

    /// Properties contributed by a single input point.
    fn map(&self, properties: &Properties) -> Properties;

    /// Fold `properties` into the running cluster `accumulated`.
    fn reduce(&self, accumulated: &mut Properties, properties: &Properties);
}

/// Clusters carry only the built-in cluster properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAggregation;

impl ClusterProperties for NoAggregation {
    fn aggregates(&self) -> bool {
        false
    }

    fn map(&self, properties: &Properties) -> Properties {
        properties.clone()
    }

    fn reduce(&self, _accumulated: &mut Properties, _properties: &Properties) {}
}

/// Sums numeric point properties into same-named cluster properties.
///
/// Missing or non-numeric values count as zero.
///
/// ```
/// use serde_json::json;
/// use supertiles_cluster::{ClusterProperties, SumProperties};
///
/// let sum = SumProperties::new(["population"]);
/// let point = |n: u64| match json!({"population": n, "name": "x"}) {
///     serde_json::Value::Object(map) => map,
///     _ => unreachable!(),
/// };
/// let mut cluster = sum.map(&point(10));
/// sum.reduce(&mut cluster, &sum.map(&point(5)));
/// assert_eq!(cluster.get("population"), Some(&json!(15)));
/// assert!(!cluster.contains_key("name"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SumProperties {
    fields: Vec<String>,
}

impl SumProperties {
    /// Sum the listed fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Fields being summed.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl ClusterProperties for SumProperties {
    fn aggregates(&self) -> bool {
        !self.fields.is_empty()
    }

    fn map(&self, properties: &Properties) -> Properties {
        self.fields
            .iter()
            .map(|field| {
                let value = properties.get(field).map_or(0.0, as_number);
                (field.clone(), number(value))
            })
            .collect()
    }

    #[expect(clippy::float_arithmetic, reason = "summing property values")]
    fn reduce(&self, accumulated: &mut Properties, properties: &Properties) {
        for field in &self.fields {
            let total = accumulated.get(field).map_or(0.0, as_number)
                + properties.get(field).map_or(0.0, as_number);
            accumulated.insert(field.clone(), number(total));
        }
    }
}

fn as_number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

/// Integral sums stay integers so they encode as integer tags.
#[expect(
    clippy::cast_possible_truncation,
    reason = "integral values are range-checked before the cast"
)]
fn number(value: f64) -> Value {
    const SAFE: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= SAFE {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
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
    fn no_aggregation_is_disabled() {
        assert!(!NoAggregation.aggregates());
    }

    #[rstest]
    fn empty_sum_is_disabled() {
        assert!(!SumProperties::default().aggregates());
        assert!(SumProperties::new(["a"]).aggregates());
    }

    #[rstest]
    fn sums_several_fields_and_ignores_non_numbers() {
        let sum = SumProperties::new(["a", "b"]);
        let mut cluster = sum.map(&props(json!({"a": 1.5, "b": "oops"})));
        sum.reduce(&mut cluster, &sum.map(&props(json!({"a": 2, "b": 4}))));
        sum.reduce(&mut cluster, &props(json!({"a": -1})));

        assert_eq!(cluster, props(json!({"a": 2.5, "b": 4})));
    }
}
