use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;

use super::OutputFormat;

/// Result of a command, with the properties shown by default in text formats
#[derive(Debug, Clone)]
pub struct Report {
    pub value: Value,
    pub properties: Option<&'static [&'static str]>,
}

impl Report {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            properties: None,
        }
    }

    pub fn with_properties(value: Value, properties: &'static [&'static str]) -> Self {
        Self {
            value,
            properties: Some(properties),
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Columns for a list: the default properties, else the scalar keys of the first item
fn columns(items: &[Value], properties: Option<&[&str]>) -> Vec<String> {
    if let Some(properties) = properties {
        return properties.iter().map(|p| p.to_string()).collect();
    }

    items
        .first()
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter(|(_, v)| !v.is_object() && !v.is_array())
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn rows(items: &[Value], columns: &[String]) -> Vec<Vec<String>> {
    items
        .iter()
        .map(|item| {
            if item.is_object() {
                columns
                    .iter()
                    .map(|c| cell(item.get(c).unwrap_or(&Value::Null)))
                    .collect()
            } else {
                vec![cell(item)]
            }
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render a report in the given format
pub fn render(report: &Report, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(&report.value).unwrap_or_else(|_| report.value.to_string());
    }

    let single;
    let items: &[Value] = match &report.value {
        Value::Array(items) => items,
        Value::Object(_) => {
            single = [report.value.clone()];
            &single
        }
        other => return cell(other),
    };

    let columns = columns(items, report.properties);
    let rows = rows(items, &columns);

    match format {
        OutputFormat::Table if report.value.is_object() => {
            let mut builder = Builder::default();
            builder.push_record(["Property", "Value"]);
            for (name, value) in columns.iter().zip(rows.into_iter().flatten()) {
                builder.push_record([name.clone(), value]);
            }
            builder.build().to_string()
        }
        OutputFormat::Table => {
            if items.is_empty() {
                return String::new();
            }
            let mut builder = Builder::default();
            builder.push_record(columns.clone());
            for row in rows {
                builder.push_record(row);
            }
            builder.build().to_string()
        }
        OutputFormat::Csv => {
            let mut lines = vec![columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(",")];
            lines.extend(
                rows.iter()
                    .map(|row| row.iter().map(|v| csv_field(v)).collect::<Vec<_>>().join(",")),
            );
            lines.join("\n")
        }
        OutputFormat::Plain | OutputFormat::Json => rows
            .iter()
            .map(|row| row.join("|"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Print a report to stdout
pub fn print_report(report: &Report, format: OutputFormat) {
    let rendered = render(report, format);
    if !rendered.is_empty() {
        println!("{}", rendered);
    }
}

/// Print success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn health() -> Report {
        Report::with_properties(
            json!([
                { "service": "Exchange Online", "status": "serviceOperational", "id": "Exchange", "issues": [] },
                { "service": "Microsoft Teams", "status": "serviceDegradation", "id": "microsoftteams", "issues": [] }
            ]),
            &["id", "status", "service"],
        )
    }

    #[test]
    fn test_json_is_pretty_raw_value() {
        let out = render(&health(), OutputFormat::Json);
        assert!(out.contains("\"issues\": []"));
        assert!(out.starts_with('['));
    }

    #[test]
    fn test_csv_uses_default_properties() {
        let out = render(&health(), OutputFormat::Csv);
        assert_eq!(
            out,
            "id,status,service\nExchange,serviceOperational,Exchange Online\nmicrosoftteams,serviceDegradation,Microsoft Teams"
        );
    }

    #[test]
    fn test_csv_quotes_values() {
        let report = Report::new(json!([{ "displayName": "Sales, \"EMEA\"", "id": "1" }]));
        assert_eq!(
            render(&report, OutputFormat::Csv),
            "displayName,id\n\"Sales, \"\"EMEA\"\"\",1"
        );
    }

    #[test]
    fn test_plain_joins_with_pipe() {
        let out = render(&health(), OutputFormat::Plain);
        assert_eq!(
            out,
            "Exchange|serviceOperational|Exchange Online\nmicrosoftteams|serviceDegradation|Microsoft Teams"
        );
    }

    #[test]
    fn test_table_contains_headers_and_values() {
        let out = render(&health(), OutputFormat::Table);
        assert!(out.contains("status"));
        assert!(out.contains("Microsoft Teams"));
        assert!(!out.contains("issues"));
    }

    #[test]
    fn test_single_object_table_skips_nested_values() {
        let report = Report::new(json!({ "id": "1", "title": "Task", "details": { "a": 1 } }));
        let out = render(&report, OutputFormat::Table);
        assert!(out.contains("Property"));
        assert!(out.contains("Task"));
        assert!(!out.contains("details"));
    }

    #[test]
    fn test_scalar_value() {
        assert_eq!(render(&Report::new(json!("done")), OutputFormat::Plain), "done");
    }
}
