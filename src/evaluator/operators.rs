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

//! Binary operator semantics

use crate::ast::BinaryOperator;
use crate::error::{FhirPathError, Result};
use crate::model::{
    Collection, FhirPathValue, Quantity, compare_values, values_equal, values_equivalent,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

/// Apply a binary operator to two evaluated operands
pub fn apply_binary(op: BinaryOperator, left: Collection, right: Collection) -> Result<Collection> {
    use BinaryOperator::*;
    match op {
        And | Or | Xor | Implies => logical(op, &left, &right),
        Equal | NotEqual => Ok(equality(&left, &right)
            .map(|eq| FhirPathValue::Boolean(eq == (op == Equal)))
            .into_iter()
            .collect()),
        Equivalent | NotEquivalent => {
            let equivalent = equivalence(&left, &right);
            Ok(Collection::single(FhirPathValue::Boolean(
                equivalent == (op == Equivalent),
            )))
        }
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            comparison(op, &left, &right)
        }
        Union => Ok(union(left, right)),
        In => membership(op, &left, &right),
        Contains => membership(op, &right, &left),
        Concatenate => {
            let text = |c: &Collection| -> Result<String> {
                match c.as_slice() {
                    [] => Ok(String::new()),
                    [v] => v.as_string().ok_or_else(|| {
                        FhirPathError::type_error(format!("'&' cannot be applied to {}", v.type_name()))
                    }),
                    _ => Err(FhirPathError::evaluation_error(
                        "'&' requires single operands",
                    )),
                }
            };
            Ok(Collection::single(FhirPathValue::String(
                text(&left)? + &text(&right)?,
            )))
        }
        Add | Subtract | Multiply | Divide | IntegerDivide | Modulo => {
            arithmetic(op, &left, &right)
        }
    }
}

fn to_boolean(op: BinaryOperator, c: &Collection) -> Result<Option<bool>> {
    match c.as_slice() {
        [] => Ok(None),
        [v] => Ok(Some(v.as_boolean().unwrap_or(true))),
        _ => Err(FhirPathError::evaluation_error(format!(
            "'{op}' requires single boolean operands"
        ))),
    }
}

fn logical(op: BinaryOperator, left: &Collection, right: &Collection) -> Result<Collection> {
    let l = to_boolean(op, left)?;
    let r = to_boolean(op, right)?;
    let result = match op {
        BinaryOperator::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOperator::Or => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOperator::Xor => match (l, r) {
            (Some(a), Some(b)) => Some(a ^ b),
            _ => None,
        },
        _ => match (l, r) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), r) => r,
            (None, _) => None,
        },
    };
    Ok(result.map(FhirPathValue::Boolean).into_iter().collect())
}

/// `Some(true)` when equal, `None` when either side is empty or the
/// comparison is undefined
fn equality(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut undefined = false;
    for (a, b) in left.iter().zip(right.iter()) {
        match values_equal(a, b) {
            Some(false) => return Some(false),
            None => undefined = true,
            Some(true) => {}
        }
    }
    (!undefined).then_some(true)
}

fn equivalence(left: &Collection, right: &Collection) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|a| right.iter().any(|b| values_equivalent(a, b)))
}

fn comparison(op: BinaryOperator, left: &Collection, right: &Collection) -> Result<Collection> {
    let (l, r) = match (left.as_slice(), right.as_slice()) {
        ([l], [r]) => (l, r),
        ([], _) | (_, []) => return Ok(Collection::new()),
        _ => {
            return Err(FhirPathError::evaluation_error(format!(
                "'{op}' requires single operands"
            )));
        }
    };
    let Some(ordering) = compare_values(l, r) else {
        return Ok(Collection::new());
    };
    let result = match op {
        BinaryOperator::LessThan => ordering == Ordering::Less,
        BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOperator::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Collection::single(FhirPathValue::Boolean(result)))
}

/// Merge two collections, dropping duplicates
pub fn union(left: Collection, right: Collection) -> Collection {
    let mut out = Collection::new();
    for value in left.into_iter().chain(right) {
        if !out.iter().any(|v| values_equal(v, &value) == Some(true)) {
            out.push(value);
        }
    }
    out
}

fn membership(op: BinaryOperator, item: &Collection, items: &Collection) -> Result<Collection> {
    match item.as_slice() {
        [] => Ok(Collection::new()),
        [value] => Ok(Collection::single(FhirPathValue::Boolean(
            items.iter().any(|v| values_equal(value, v) == Some(true)),
        ))),
        _ => Err(FhirPathError::evaluation_error(format!(
            "'{op}' requires a single item"
        ))),
    }
}

fn arithmetic(op: BinaryOperator, left: &Collection, right: &Collection) -> Result<Collection> {
    let (l, r) = match (left.as_slice(), right.as_slice()) {
        ([l], [r]) => (l.normalized(), r.normalized()),
        ([], _) | (_, []) => return Ok(Collection::new()),
        _ => {
            return Err(FhirPathError::evaluation_error(format!(
                "'{op}' requires single operands"
            )));
        }
    };
    let unsupported = || {
        FhirPathError::type_error(format!(
            "'{op}' cannot be applied to {} and {}",
            l.type_name(),
            r.type_name()
        ))
    };

    let result = match (l.as_ref(), r.as_ref()) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => integer_arithmetic(op, *a, *b),
        (FhirPathValue::String(a), FhirPathValue::String(b)) if op == BinaryOperator::Add => {
            Some(FhirPathValue::String(format!("{a}{b}")))
        }
        (FhirPathValue::Quantity(a), FhirPathValue::Quantity(b)) => {
            quantity_arithmetic(op, a, b).ok_or_else(unsupported)?
        }
        (FhirPathValue::Quantity(q), n) if matches!(op, BinaryOperator::Multiply | BinaryOperator::Divide) => {
            let factor = n.as_decimal().ok_or_else(unsupported)?;
            decimal_arithmetic(op, q.value, factor).map(|value| {
                FhirPathValue::Quantity(Quantity {
                    value: value.as_decimal().unwrap_or_default(),
                    unit: q.unit.clone(),
                })
            })
        }
        (a, b) => match (a.as_decimal(), b.as_decimal()) {
            (Some(x), Some(y)) => decimal_arithmetic(op, x, y),
            _ => return Err(unsupported()),
        },
    };
    Ok(result.into_iter().collect())
}

fn integer_arithmetic(op: BinaryOperator, a: i64, b: i64) -> Option<FhirPathValue> {
    use BinaryOperator::*;
    let value = match op {
        Add => a.checked_add(b)?,
        Subtract => a.checked_sub(b)?,
        Multiply => a.checked_mul(b)?,
        IntegerDivide => a.checked_div(b)?,
        Modulo => a.checked_rem(b)?,
        _ => return decimal_arithmetic(op, Decimal::from(a), Decimal::from(b)),
    };
    Some(FhirPathValue::Integer(value))
}

fn decimal_arithmetic(op: BinaryOperator, a: Decimal, b: Decimal) -> Option<FhirPathValue> {
    use BinaryOperator::*;
    let value = match op {
        Add => a.checked_add(b)?,
        Subtract => a.checked_sub(b)?,
        Multiply => a.checked_mul(b)?,
        Divide => a.checked_div(b)?.normalize(),
        IntegerDivide => {
            let quotient = a.checked_div(b)?.trunc();
            return quotient.to_i64().map(FhirPathValue::Integer);
        }
        Modulo => a.checked_rem(b)?,
        _ => return None,
    };
    Some(FhirPathValue::Decimal(value))
}

fn quantity_arithmetic(op: BinaryOperator, a: &Quantity, b: &Quantity) -> Option<Option<FhirPathValue>> {
    if a.unit != b.unit || !matches!(op, BinaryOperator::Add | BinaryOperator::Subtract) {
        return None;
    }
    let value = match op {
        BinaryOperator::Add => a.value.checked_add(b.value),
        _ => a.value.checked_sub(b.value),
    };
    Some(value.map(|value| {
        FhirPathValue::Quantity(Quantity {
            value,
            unit: a.unit.clone(),
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn int(i: i64) -> Collection {
        Collection::single(FhirPathValue::Integer(i))
    }

    fn boolean(b: bool) -> Collection {
        Collection::single(FhirPathValue::Boolean(b))
    }

    #[test]
    fn test_integer_arithmetic() {
        let sum = apply_binary(BinaryOperator::Add, int(1), int(1)).unwrap();
        assert_eq!(sum, int(2));
        let quotient = apply_binary(BinaryOperator::Divide, int(7), int(2)).unwrap();
        assert_eq!(
            quotient,
            Collection::single(FhirPathValue::Decimal(Decimal::from_str("3.5").unwrap()))
        );
        assert!(
            apply_binary(BinaryOperator::Divide, int(1), int(0))
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            apply_binary(BinaryOperator::IntegerDivide, int(7), int(2)).unwrap(),
            int(3)
        );
    }

    #[test]
    fn test_three_valued_logic() {
        let empty = Collection::new();
        assert_eq!(
            apply_binary(BinaryOperator::And, boolean(false), empty.clone()).unwrap(),
            boolean(false)
        );
        assert!(
            apply_binary(BinaryOperator::And, boolean(true), empty.clone())
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            apply_binary(BinaryOperator::Implies, empty, boolean(true)).unwrap(),
            boolean(true)
        );
    }

    #[test]
    fn test_equality_with_empty_is_empty() {
        assert!(
            apply_binary(BinaryOperator::Equal, int(1), Collection::new())
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            apply_binary(BinaryOperator::NotEqual, int(1), int(2)).unwrap(),
            boolean(true)
        );
    }

    #[test]
    fn test_union_removes_duplicates() {
        let left: Collection = vec![FhirPathValue::Integer(1), FhirPathValue::Integer(2)].into();
        let right: Collection = vec![FhirPathValue::Integer(2), FhirPathValue::Integer(3)].into();
        let merged = apply_binary(BinaryOperator::Union, left, right).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_concatenate_treats_empty_as_empty_string() {
        let left = Collection::single(FhirPathValue::String("a".into()));
        assert_eq!(
            apply_binary(BinaryOperator::Concatenate, left, Collection::new()).unwrap(),
            Collection::single(FhirPathValue::String("a".into()))
        );
    }
}
