//! Common Observability Utilities
//!
//! Shared table formatting used by the trackers.

fn format_row(list: Vec<String>) -> String {
    format!("| {} |\n", list.join(" | "))
}

/// Format a two column table with a title
pub fn format_key_value_table(title: &str, rows: &[(&str, String)]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let value_width = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0);

    // Content between outer "| " and " |", widened to fit the title
    let mut value_width = value_width;
    let inner_width = (key_width + 3 + value_width).max(title.len());
    if inner_width > key_width + 3 + value_width {
        value_width = inner_width - key_width - 3;
    }

    let mut output = String::new();
    output.push_str(&format!(" {} \n", "=".repeat(inner_width + 2)));
    output.push_str(&format!("| {:<inner_width$} |\n", title));
    output.push_str(&format!("|-{}-|\n", "-".repeat(inner_width)));

    for (key, value) in rows {
        output.push_str(&format_row(vec![
            format!("{:key_width$}", key),
            format!("{:>value_width$}", value),
        ]));
    }

    output.push_str(&format!(" {} \n", "-".repeat(inner_width + 2)));
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lines_have_equal_width() {
        let table = format_key_value_table(
            "Uplink",
            &[("Delivered", "12".to_string()), ("Abandoned", "1".to_string())],
        );
        let widths: Vec<usize> = table.lines().map(|l| l.len()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{table}");
        assert!(table.contains("| Delivered | 12 |"));
    }

    #[test]
    fn test_title_wider_than_rows() {
        let table = format_key_value_table("A rather long title", &[("k", "v".to_string())]);
        let widths: Vec<usize> = table.lines().map(|l| l.len()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{table}");
    }

    #[test]
    fn test_empty_rows() {
        assert!(format_key_value_table("Empty", &[]).is_empty());
    }
}
