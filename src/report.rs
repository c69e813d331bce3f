use prettytable::{format, Cell, Row, Table};

use crate::image_processing::batch::{failures, BatchItem};
use crate::image_processing::OperationDescriptor;

fn describe_params(op: &OperationDescriptor) -> String {
    if op.params.is_empty() {
        return "-".to_string();
    }
    op.params
        .iter()
        .map(|p| format!("{} ({}) = {}", p.name, p.kind.as_str(), p.default))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Operation registry as a table: name, label, parameters with defaults
pub fn operations_table(operations: &[OperationDescriptor]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.add_row(Row::new(vec![
        Cell::new("Operation"),
        Cell::new("Label"),
        Cell::new("Parameters"),
    ]));

    for op in operations {
        table.add_row(Row::new(vec![
            Cell::new(op.name),
            Cell::new(op.label),
            Cell::new(&describe_params(op)),
        ]));
    }
    table
}

/// Failed batch items with their error kind and message
pub fn failures_table(items: &[BatchItem]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.add_row(Row::new(vec![
        Cell::new("Input"),
        Cell::new("Kind"),
        Cell::new("Error"),
    ]));

    for (input, error) in failures(items) {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        table.add_row(Row::new(vec![
            Cell::new(name),
            Cell::new(error.kind()),
            Cell::new(&error.to_string()),
        ]));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use crate::image_processing::list_operations;
    use std::path::PathBuf;

    #[test]
    fn test_operations_table_has_row_per_operation() {
        let ops = list_operations();
        let table = operations_table(&ops);
        assert_eq!(table.len(), ops.len() + 1);

        let rendered = table.to_string();
        assert!(rendered.contains("smooth_bilateral"));
        assert!(rendered.contains("sigmaColor (int) = 75"));
        assert!(rendered.contains("scale (float) = 0.5"));
    }

    #[test]
    fn test_failures_table_lists_only_errors() {
        let items = vec![
            BatchItem {
                input: PathBuf::from("/in/ok.png"),
                result: Ok(PathBuf::from("/out/ok.png")),
            },
            BatchItem {
                input: PathBuf::from("/in/bad.png"),
                result: Err(ProcessingError::UnsupportedOperation("x".to_string())),
            },
        ];
        let table = failures_table(&items);
        assert_eq!(table.len(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("bad.png"));
        assert!(rendered.contains("unsupported_operation"));
        assert!(!rendered.contains("ok.png"));
    }
}
