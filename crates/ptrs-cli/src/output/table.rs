use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{flatten_scalars, format_value, object_lists, unwrap_result};

/// Field/value table for the scalars, then one table per list of records
/// (issues, results, row changes).
pub fn print_table(value: &Value) {
    let body = unwrap_result(value);

    let mut fields = Vec::new();
    flatten_scalars(body, "", &mut fields);
    if !fields.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in &fields {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }

    for (name, items) in object_lists(body) {
        println!("\n{} ({}):", name, items.len());
        print_records(items);
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if value.get("result").is_some() && !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_records(items: &[Value]) {
    if items.is_empty() {
        println!("(empty)");
        return;
    }
    let Some(Value::Object(first)) = items.first() else {
        return;
    };
    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.clone());
    for item in items {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }
    }
    println!("{}", Table::from(builder));
}
