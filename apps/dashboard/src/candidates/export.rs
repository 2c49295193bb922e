//! CSV export of the ranked view.
//!
//! Columns: Rank, Name, Score, Experience, Skills. Rank is the row's position
//! in the exported list.

use anyhow::Result;
use serde::Deserialize;

use crate::candidates::ranking::RankedRow;
use crate::candidates::selection::SelectionSet;

const HEADERS: [&str; 5] = ["Rank", "Name", "Score", "Experience", "Skills"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportScope {
    #[default]
    All,
    Selected,
}

pub fn export_filename(job_id: &str) -> String {
    format!("Analysis_Report_{job_id}.csv")
}

/// Whole scores print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn format_experience(years: Option<f64>) -> String {
    match years {
        Some(y) if y > 0.0 => format_number(y),
        _ => "N/A".to_string(),
    }
}

/// Rows included in an export of `scope`, in ranked order.
pub fn rows_for_scope<'a>(
    rows: &'a [RankedRow],
    selection: &SelectionSet,
    scope: ExportScope,
) -> Vec<&'a RankedRow> {
    rows.iter()
        .filter(|row| match scope {
            ExportScope::All => true,
            ExportScope::Selected => selection.contains(&row.candidate.candidate.filename),
        })
        .collect()
}

pub fn render_csv(rows: &[&RankedRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for (i, row) in rows.iter().enumerate() {
        let c = &row.candidate.candidate;
        writer.write_record([
            (i + 1).to_string(),
            c.filename.clone(),
            format_number(c.final_score),
            format_experience(c.experience_years),
            c.matched_skills.join(", "),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
