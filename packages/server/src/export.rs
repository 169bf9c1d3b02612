//! CSV rendering of a Profile's sample history.
//!
//! Shared by `GET /v1/profiles/{id}/metrics.csv` and `netinsight export`.

use crate::storage::{Cell, SampleTable};

/// Column dropped from the export when no sample for the Profile carries it.
pub const OPTIONAL_JITTER_COLUMN: &str = "speedtest_jitter_ms";

/// Sole row written when the Profile has no samples.
pub const NO_DATA_ROW: &str = "No data available for this agent.";

/// Render `table` as CSV, one header row then one row per sample.
pub fn render_csv(table: &SampleTable) -> String {
    let mut out = String::new();

    if table.rows.is_empty() {
        write_record(&mut out, [NO_DATA_ROW.to_string()]);
        return out;
    }

    let jitter = table
        .columns
        .iter()
        .position(|c| c == OPTIONAL_JITTER_COLUMN);
    let skip = jitter.filter(|&i| table.rows.iter().all(|row| row[i].is_null()));
    let keep = |i: &usize| Some(*i) != skip;

    write_record(
        &mut out,
        (0..table.columns.len())
            .filter(keep)
            .map(|i| table.columns[i].clone()),
    );
    for row in &table.rows {
        write_record(
            &mut out,
            (0..row.len()).filter(keep).map(|i| cell_text(&row[i])),
        );
    }
    out
}

/// `sla_history_<name>.csv`, with every character outside `[A-Za-z0-9_]`
/// replaced by `_`.
pub fn export_filename(agent_name: &str) -> String {
    let safe: String = agent_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("sla_history_{safe}.csv")
}

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Integer(i) => i.to_string(),
        Cell::Real(f) => f.to_string(),
        Cell::Text(s) => s.clone(),
    }
}

fn write_record(out: &mut String, fields: impl IntoIterator<Item = String>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r', '\t', ' ']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<Vec<Cell>>) -> SampleTable {
        SampleTable {
            columns: vec![
                "id".into(),
                "timestamp".into(),
                "speedtest_jitter_ms".into(),
                "detailed_health_summary".into(),
            ],
            rows,
        }
    }

    #[test]
    fn empty_table_writes_no_data_row() {
        let csv = render_csv(&table(vec![]));
        assert_eq!(csv, "\"No data available for this agent.\"\n");
    }

    #[test]
    fn jitter_column_dropped_when_never_reported() {
        let csv = render_csv(&table(vec![vec![
            Cell::Integer(1),
            Cell::Text("t1".into()),
            Cell::Null,
            Cell::Text("ok".into()),
        ]]));
        assert_eq!(csv, "id,timestamp,detailed_health_summary\n1,t1,ok\n");
    }

    #[test]
    fn jitter_column_kept_when_any_row_has_it() {
        let csv = render_csv(&table(vec![
            vec![Cell::Integer(1), Cell::Text("t1".into()), Cell::Null, Cell::Null],
            vec![
                Cell::Integer(2),
                Cell::Text("t2".into()),
                Cell::Real(2.5),
                Cell::Null,
            ],
        ]));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,timestamp,speedtest_jitter_ms,detailed_health_summary");
        assert_eq!(lines[1], "1,t1,,");
        assert_eq!(lines[2], "2,t2,2.5,");
    }

    #[test]
    fn fields_needing_quotes_are_enclosed() {
        let csv = render_csv(&table(vec![vec![
            Cell::Integer(1),
            Cell::Text("2024-01-01 00:00".into()),
            Cell::Real(1.0),
            Cell::Text("say \"hi\", then".into()),
        ]]));
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(line, "1,\"2024-01-01 00:00\",1,\"say \"\"hi\"\", then\"");
    }

    #[test]
    fn filename_is_sanitised() {
        assert_eq!(export_filename("branch-1.lan"), "sla_history_branch_1_lan.csv");
        assert_eq!(export_filename("ok_name9"), "sla_history_ok_name9.csv");
    }
}
