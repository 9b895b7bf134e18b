use serde_json::Value;
use std::io;

use super::{flatten_scalars, format_value, object_lists, unwrap_result};

/// Write output as CSV to stdout.
///
/// An ABN export prints its CSV verbatim. A validation report prints one row
/// per issue with a severity column. Anything else prints field,value pairs.
pub fn print_csv(value: &Value) {
    let body = unwrap_result(value);

    if let Some(Value::String(csv_text)) = body.get("csv") {
        print!("{}", csv_text);
        return;
    }

    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    if body.get("blockers").is_some() && body.get("counts").is_some() {
        write_issues(&mut wtr, body);
    } else if let Some((_, items)) = object_lists(body).into_iter().next() {
        write_records(&mut wtr, items);
    } else {
        let mut fields = Vec::new();
        flatten_scalars(body, "", &mut fields);
        let _ = wtr.write_record(["field", "value"]);
        for (key, val) in &fields {
            let _ = wtr.write_record([key.as_str(), &format_value(val)]);
        }
    }

    let _ = wtr.flush();
}

fn write_issues<W: io::Write>(wtr: &mut csv::Writer<W>, report: &Value) {
    let _ = wtr.write_record(["severity", "code", "row_number", "abn", "message"]);
    for (severity, key) in [("blocker", "blockers"), ("warning", "warnings")] {
        let Some(Value::Array(issues)) = report.get(key) else {
            continue;
        };
        for issue in issues {
            let field = |name: &str| issue.get(name).map(format_value).unwrap_or_default();
            let _ = wtr.write_record([
                severity.to_string(),
                field("code"),
                field("row_number"),
                field("abn"),
                field("message"),
            ]);
        }
    }
}

fn write_records<W: io::Write>(wtr: &mut csv::Writer<W>, items: &[Value]) {
    let Some(Value::Object(first)) = items.first() else {
        return;
    };
    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    let _ = wtr.write_record(&headers);
    for item in items {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_value).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}
