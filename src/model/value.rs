// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Value types for FHIRPath evaluation

use super::node::ElementNode;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// FHIRPath value
///
/// System primitives are held directly; anything read from a document or a
/// caller-supplied fragment stays an [`ElementNode`] so that its name,
/// location and declared type survive into the output.
#[derive(Debug, Clone, PartialEq)]
pub enum FhirPathValue {
    /// Boolean value
    Boolean(bool),

    /// Integer value (64-bit signed)
    Integer(i64),

    /// Decimal value with arbitrary precision
    Decimal(Decimal),

    /// String value
    String(String),

    /// Date value, FHIR textual form (partial precision allowed)
    Date(String),

    /// DateTime value, FHIR textual form
    DateTime(String),

    /// Time value, FHIR textual form
    Time(String),

    /// Quantity value with optional unit
    Quantity(Quantity),

    /// Node of a document or raw fragment
    Element(ElementNode),

    /// The `%terminologies` handle bound to a terminology server
    Terminologies(String),
}

/// Quantity value
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    /// Numeric value
    pub value: Decimal,
    /// UCUM code or calendar keyword
    pub unit: Option<String>,
}

/// Collection type that wraps a vector of values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection(Vec<FhirPathValue>);

impl Collection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Collection holding one value
    pub fn single(value: FhirPathValue) -> Self {
        Self(vec![value])
    }

    /// Create a collection from a vector
    pub fn from_vec(values: Vec<FhirPathValue>) -> Self {
        Self(values)
    }

    /// Add a value
    pub fn push(&mut self, value: FhirPathValue) {
        self.0.push(value);
    }

    /// Append all values of another collection
    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    /// Consume into the inner vector
    pub fn into_vec(self) -> Vec<FhirPathValue> {
        self.0
    }

    /// Values as a slice
    pub fn as_slice(&self) -> &[FhirPathValue] {
        &self.0
    }

    /// Single value, or `None` for empty and multi-valued collections
    pub fn as_single(&self) -> Option<&FhirPathValue> {
        match self.0.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }
}

impl std::ops::Deref for Collection {
    type Target = [FhirPathValue];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<FhirPathValue>> for Collection {
    fn from(values: Vec<FhirPathValue>) -> Self {
        Self(values)
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<I: IntoIterator<Item = FhirPathValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = FhirPathValue;
    type IntoIter = std::vec::IntoIter<FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a FhirPathValue;
    type IntoIter = std::slice::Iter<'a, FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FhirPathValue {
    /// Build a system value from a JSON scalar
    pub fn from_json_scalar(value: &Value) -> Option<FhirPathValue> {
        match value {
            Value::Bool(b) => Some(FhirPathValue::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FhirPathValue::Integer(i)),
                None => Decimal::from_str(&n.to_string())
                    .or_else(|_| Decimal::from_scientific(&n.to_string()))
                    .ok()
                    .map(FhirPathValue::Decimal),
            },
            Value::String(s) => Some(FhirPathValue::String(s.clone())),
            _ => None,
        }
    }

    /// Collapse primitive elements into their system value
    ///
    /// Complex elements and system values are returned unchanged.
    pub fn normalized(&self) -> Cow<'_, FhirPathValue> {
        match self {
            FhirPathValue::Element(node) => match node.to_system_value() {
                Some(value) => Cow::Owned(value),
                None => Cow::Borrowed(self),
            },
            other => Cow::Borrowed(other),
        }
    }

    /// FHIR type name of a system value, or the declared type of a node
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            FhirPathValue::Boolean(_) => Cow::Borrowed("boolean"),
            FhirPathValue::Integer(_) => Cow::Borrowed("integer"),
            FhirPathValue::Decimal(_) => Cow::Borrowed("decimal"),
            FhirPathValue::String(_) => Cow::Borrowed("string"),
            FhirPathValue::Date(_) => Cow::Borrowed("date"),
            FhirPathValue::DateTime(_) => Cow::Borrowed("dateTime"),
            FhirPathValue::Time(_) => Cow::Borrowed("time"),
            FhirPathValue::Quantity(_) => Cow::Borrowed("Quantity"),
            FhirPathValue::Element(node) => Cow::Borrowed(node.type_name().unwrap_or("Element")),
            FhirPathValue::Terminologies(_) => Cow::Borrowed("Terminologies"),
        }
    }

    /// Element node, if this is one
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            FhirPathValue::Element(node) => Some(node),
            _ => None,
        }
    }

    /// String form used by `toString()`, string functions and `&`
    ///
    /// Returns `None` for complex values.
    pub fn as_string(&self) -> Option<String> {
        match self.normalized().as_ref() {
            FhirPathValue::Boolean(b) => Some(b.to_string()),
            FhirPathValue::Integer(i) => Some(i.to_string()),
            FhirPathValue::Decimal(d) => Some(d.to_string()),
            FhirPathValue::String(s)
            | FhirPathValue::Date(s)
            | FhirPathValue::DateTime(s)
            | FhirPathValue::Time(s) => Some(s.clone()),
            FhirPathValue::Quantity(q) => Some(match &q.unit {
                Some(unit) => format!("{} '{}'", q.value, unit),
                None => q.value.to_string(),
            }),
            FhirPathValue::Element(_) | FhirPathValue::Terminologies(_) => None,
        }
    }

    /// Boolean value, for singleton evaluation of criteria
    pub fn as_boolean(&self) -> Option<bool> {
        match self.normalized().as_ref() {
            FhirPathValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self.normalized().as_ref() {
            FhirPathValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as decimal, integers included
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.normalized().as_ref() {
            FhirPathValue::Integer(i) => Some(Decimal::from(*i)),
            FhirPathValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// JSON rendering of the value as it appears in a FHIR `value[x]`
    pub fn to_json(&self) -> Value {
        match self {
            FhirPathValue::Boolean(b) => Value::Bool(*b),
            FhirPathValue::Integer(i) => json!(i),
            FhirPathValue::Decimal(d) => decimal_to_json(d),
            FhirPathValue::String(s)
            | FhirPathValue::Date(s)
            | FhirPathValue::DateTime(s)
            | FhirPathValue::Time(s) => Value::String(s.clone()),
            FhirPathValue::Quantity(q) => {
                let mut object = serde_json::Map::new();
                object.insert("value".to_string(), decimal_to_json(&q.value));
                if let Some(unit) = &q.unit {
                    object.insert("unit".to_string(), Value::String(unit.clone()));
                    object.insert(
                        "system".to_string(),
                        Value::String("http://unitsofmeasure.org".to_string()),
                    );
                    object.insert("code".to_string(), Value::String(unit.clone()));
                }
                Value::Object(object)
            }
            FhirPathValue::Element(node) => node.json().clone(),
            FhirPathValue::Terminologies(server) => json!({ "server": server }),
        }
    }
}

fn decimal_to_json(d: &Decimal) -> Value {
    serde_json::from_str::<Value>(&d.to_string())
        .ok()
        .filter(Value::is_number)
        .or_else(|| d.to_f64().map(|f| json!(f)))
        .unwrap_or(Value::Null)
}

/// Equality as defined for the `=` operator
///
/// `None` means the comparison is undefined (different kinds of value).
pub fn values_equal(left: &FhirPathValue, right: &FhirPathValue) -> Option<bool> {
    let left = left.normalized();
    let right = right.normalized();
    match (left.as_ref(), right.as_ref()) {
        (FhirPathValue::Boolean(a), FhirPathValue::Boolean(b)) => Some(a == b),
        (FhirPathValue::String(a), FhirPathValue::String(b)) => Some(a == b),
        (FhirPathValue::Element(a), FhirPathValue::Element(b)) => Some(a.json() == b.json()),
        (FhirPathValue::Quantity(a), FhirPathValue::Quantity(b)) => {
            if a.unit == b.unit {
                Some(a.value == b.value)
            } else {
                None
            }
        }
        (a, b) => match (a.as_decimal(), b.as_decimal()) {
            (Some(x), Some(y)) => Some(x == y),
            _ => compare_temporal(a, b).map(|ordering| ordering == Ordering::Equal),
        },
    }
}

/// Equivalence as defined for the `~` operator
pub fn values_equivalent(left: &FhirPathValue, right: &FhirPathValue) -> bool {
    let left = left.normalized();
    let right = right.normalized();
    match (left.as_ref(), right.as_ref()) {
        (FhirPathValue::String(a), FhirPathValue::String(b)) => {
            normalize_whitespace(a).eq_ignore_ascii_case(&normalize_whitespace(b))
        }
        (a, b) => values_equal(a, b).unwrap_or(false),
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordering as defined for `<`, `<=`, `>` and `>=`
pub fn compare_values(left: &FhirPathValue, right: &FhirPathValue) -> Option<Ordering> {
    let left = left.normalized();
    let right = right.normalized();
    match (left.as_ref(), right.as_ref()) {
        (FhirPathValue::String(a), FhirPathValue::String(b)) => Some(a.cmp(b)),
        (FhirPathValue::Quantity(a), FhirPathValue::Quantity(b)) if a.unit == b.unit => {
            a.value.partial_cmp(&b.value)
        }
        (a, b) => match (a.as_decimal(), b.as_decimal()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => compare_temporal(a, b),
        },
    }
}

/// Dates and times compare lexically when the shorter is a prefix-compatible
/// precision of the longer; mismatched precision is undefined
fn compare_temporal(left: &FhirPathValue, right: &FhirPathValue) -> Option<Ordering> {
    let (a, b) = match (left, right) {
        (
            FhirPathValue::Date(a) | FhirPathValue::DateTime(a),
            FhirPathValue::Date(b) | FhirPathValue::DateTime(b),
        ) => (a, b),
        (FhirPathValue::Time(a), FhirPathValue::Time(b)) => (a, b),
        _ => return None,
    };
    if a.len() == b.len() {
        return Some(a.cmp(b));
    }
    let common = a.len().min(b.len());
    match a.as_bytes()[..common].cmp(&b.as_bytes()[..common]) {
        Ordering::Equal => None,
        other => Some(other),
    }
}

impl fmt::Display for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "{}", self.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::ElementNode;
    use serde_json::json;

    #[test]
    fn test_collection_single() {
        let single = Collection::single(FhirPathValue::Integer(1));
        assert_eq!(single.as_single(), Some(&FhirPathValue::Integer(1)));
        let many: Collection = vec![FhirPathValue::Integer(1), FhirPathValue::Integer(2)].into();
        assert_eq!(many.as_single(), None);
    }

    #[test]
    fn test_numeric_equality_crosses_integer_and_decimal() {
        let one = FhirPathValue::Integer(1);
        let one_point_zero = FhirPathValue::Decimal(Decimal::from_str("1.0").unwrap());
        assert_eq!(values_equal(&one, &one_point_zero), Some(true));
        assert_eq!(
            values_equal(&one, &FhirPathValue::String("1".into())),
            None
        );
    }

    #[test]
    fn test_primitive_element_normalizes() {
        let node = ElementNode::fragment(json!("male"));
        let value = FhirPathValue::Element(node);
        assert_eq!(
            values_equal(&value, &FhirPathValue::String("male".into())),
            Some(true)
        );
    }

    #[test]
    fn test_string_equivalence_ignores_case_and_spacing() {
        assert!(values_equivalent(
            &FhirPathValue::String("Hello  World".into()),
            &FhirPathValue::String("hello world".into())
        ));
    }

    #[test]
    fn test_date_comparison() {
        let a = FhirPathValue::Date("2020-01-01".into());
        let b = FhirPathValue::Date("2021-01-01".into());
        assert_eq!(compare_values(&a, &b), Some(Ordering::Less));
        let partial = FhirPathValue::Date("2020".into());
        assert_eq!(compare_values(&a, &partial), None);
    }

    #[test]
    fn test_decimal_json_rendering() {
        let value = FhirPathValue::Decimal(Decimal::from_str("2.50").unwrap());
        assert_eq!(value.to_json(), json!(2.5));
    }
}
