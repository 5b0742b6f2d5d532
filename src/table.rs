pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths = headers.iter().map(|header| header.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (index, cell) in row.iter().enumerate().take(columns) {
            widths[index] = widths[index].max(cell.chars().count());
        }
    }

    let numeric_columns = (0..columns)
        .map(|index| {
            !rows.is_empty()
                && rows.iter().all(|row| {
                    row.get(index)
                        .map(|cell| cell.parse::<f64>().is_ok())
                        .unwrap_or(true)
                })
        })
        .collect::<Vec<_>>();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render_line(
        headers.iter().map(|header| header.to_string()),
        &widths,
        &numeric_columns,
    ));
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        lines.push(render_line(
            (0..columns).map(|index| row.get(index).cloned().unwrap_or_default()),
            &widths,
            &numeric_columns,
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn format_score(value: f64) -> String {
    format!("{value:.4}")
}

pub fn format_optional_score(value: Option<f64>) -> String {
    value.map(format_score).unwrap_or_else(|| "-".to_string())
}

fn render_line(
    cells: impl Iterator<Item = String>,
    widths: &[usize],
    numeric_columns: &[bool],
) -> String {
    cells
        .enumerate()
        .map(|(index, cell)| {
            let width = widths[index];
            if numeric_columns[index] {
                format!("{cell:>width$}")
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
