//! Ready-made capabilities.

use anyhow::anyhow;
use serde_json::json;
use std::collections::HashMap;

use crate::models::tool::{ParameterSchema, ParameterType};
use crate::tool::Capability;

/// `lookup(key)` over a fixed table.
///
/// Unknown keys are not a failure of the capability: the result carries an
/// `error` field for the model to read.
pub fn lookup(table: HashMap<String, String>) -> Capability {
    Capability::new(
        "lookup",
        "Look up the value stored under a key",
        ParameterSchema::new().required("key", ParameterType::String, "The key to look up"),
        move |args| {
            let key = args
                .get("key")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("key must be a string"))?;
            Ok(match table.get(key) {
                Some(value) => json!({ "key": key, "value": value }),
                None => json!({ "key": key, "error": "not found" }),
            })
        },
    )
}

/// `get_salary_info(employee_name)` backed by a small demo payroll table.
pub fn salary_info() -> Capability {
    let salaries: HashMap<&'static str, &'static str> =
        HashMap::from([("Alice", "120000"), ("Bob", "95000"), ("Charlie", "105000")]);

    Capability::new(
        "get_salary_info",
        "Get salary information for a specific employee",
        ParameterSchema::new().required(
            "employee_name",
            ParameterType::String,
            "The name of the employee",
        ),
        move |args| {
            let name = args
                .get("employee_name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("employee_name must be a string"))?;
            Ok(match salaries.get(name) {
                Some(salary) => json!({ "name": name, "salary": salary, "currency": "USD" }),
                None => json!({ "name": name, "error": "Employee not found" }),
            })
        },
    )
}
