use fmgen_core::*;
use serde_json::json;

#[test]
fn dictionary_round_trip() -> Result<(), ExpressionError> {
    let json = json!({
        "op": "ite",
        "if": {"op": "∧", "left": "ready", "right": {"op": "¬", "exp": "busy"}},
        "then": {"op": "aa", "exp": "queue", "index": 2},
        "else": {"op": "av", "elements": [1, 2, 3]},
    });
    let exp = Expression::from_json(&json)?;
    assert_eq!(exp.to_json(), json);
    assert_eq!(exp.to_string(), "((ready ∧ ¬busy) ? queue[2] : [1, 2, 3])");
    Ok(())
}

#[test]
fn aliases_are_normalized() -> Result<(), ExpressionError> {
    let exp = Expression::from_json(&json!({"op": "&&", "left": "a", "right": {"op": "<=", "left": 1, "right": 2.5}}))?;
    assert_eq!(
        exp.to_json(),
        json!({"op": "∧", "left": "a", "right": {"op": "≤", "left": 1, "right": 2.5}})
    );
    Ok(())
}

#[test]
fn malformed_operators() {
    assert_eq!(
        Expression::from_json(&json!({"op": "+", "left": 1})),
        Err(ExpressionError::MissingOperand {
            op: OpTag::Add,
            operand: "right"
        })
    );
    assert_eq!(
        Expression::from_json(&json!({"op": "¬", "exp": true, "left": 1})),
        Err(ExpressionError::UnexpectedOperand {
            op: OpTag::Not,
            operand: "left".to_owned()
        })
    );
    assert_eq!(
        Expression::from_json(&json!({"op": "xor", "left": true, "right": false})),
        Err(ExpressionError::UnknownOperator("xor".to_owned()))
    );
    assert!(Expression::from_json(&json!(null)).is_err());
}

#[test]
fn distributions() -> Result<(), ExpressionError> {
    let json = json!({"distribution": "Uniform", "args": [0.0, 2.0]});
    let exp = Expression::from_json(&json)?;
    assert!(exp.contains_distribution());
    assert_eq!(exp.to_json(), json);

    let sum = Expression::binary(OpTag::Add, Expression::identifier("x"), exp);
    assert!(sum.contains_distribution());
    assert!(!Expression::identifier("x").contains_distribution());

    assert!(matches!(
        Expression::from_json(&json!({"distribution": "Uniform", "args": [2.0, 0.0]})),
        Err(ExpressionError::UniformBounds { .. })
    ));
    assert!(matches!(
        Expression::from_json(&json!({"distribution": "Normal", "args": [0.0, 1.0]})),
        Err(ExpressionError::UnknownDistribution(_))
    ));
    Ok(())
}

#[test]
fn constants() -> Result<(), ExpressionError> {
    let exp = Expression::from_json(&json!({"op": "*", "left": 2, "right": {"constant": "π"}}))?;
    let value = exp.eval(&|_| None).unwrap();
    assert_eq!(value, Value::Real(2. * std::f64::consts::PI));
    assert!(Expression::from_json(&json!({"constant": "τ"})).is_err());
    Ok(())
}

#[test]
fn serde_goes_through_dictionary_form() {
    let exp: Expression = serde_json::from_value(json!({"op": ">", "left": "x", "right": 0})).unwrap();
    assert_eq!(
        exp,
        Expression::binary(OpTag::Greater, Expression::identifier("x"), 0i64.into())
    );
    assert_eq!(
        serde_json::to_value(&exp).unwrap(),
        json!({"op": ">", "left": "x", "right": 0})
    );
}
