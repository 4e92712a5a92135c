use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::models::{
    data_rows, BullyingCategory, LedgerRow, Record, CATEGORY_COLUMN, LEDGER_HEADER, SCORE_COLUMN,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub mean_score: Option<f64>,
}

/// Submissions per bullying type, in the order each type first appears.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    pub counts: Vec<CategoryCount>,
}

impl FrequencyTable {
    #[cfg(test)]
    pub fn from_categories<'a, I>(categories: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = Builder::default();
        for category in categories {
            builder.add(category, None);
        }
        builder.finish()
    }

    /// Groups ledger rows by their bullying-type cell. Blank cells are
    /// skipped; known labels are folded onto their canonical name.
    pub fn from_rows(rows: &[LedgerRow]) -> Self {
        let mut builder = Builder::default();
        for row in data_rows(rows) {
            let Some(category) = row.get(CATEGORY_COLUMN) else {
                continue;
            };
            let score = row
                .get(SCORE_COLUMN)
                .and_then(|cell| cell.trim().parse::<f64>().ok())
                .filter(|score| score.is_finite());
            builder.add(category, score);
        }
        builder.finish()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|entry| entry.count).sum()
    }

    /// Highest count; the earliest seen category wins a tie.
    pub fn most_common(&self) -> Option<&CategoryCount> {
        let mut best: Option<&CategoryCount> = None;
        for entry in &self.counts {
            if best.map_or(true, |current| entry.count > current.count) {
                best = Some(entry);
            }
        }
        best
    }

    /// Lowest count; the earliest seen category wins a tie.
    pub fn least_common(&self) -> Option<&CategoryCount> {
        let mut best: Option<&CategoryCount> = None;
        for entry in &self.counts {
            if best.map_or(true, |current| entry.count < current.count) {
                best = Some(entry);
            }
        }
        best
    }
}

#[derive(Default)]
struct Builder {
    entries: Vec<(String, usize, f64, usize)>,
}

impl Builder {
    fn add(&mut self, raw: &str, score: Option<f64>) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let category = BullyingCategory::normalize(raw)
            .map(|known| known.label().to_string())
            .unwrap_or_else(|| raw.to_string());

        let position = match self.entries.iter().position(|entry| entry.0 == category) {
            Some(position) => position,
            None => {
                self.entries.push((category, 0, 0.0, 0));
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[position];
        entry.1 += 1;
        if let Some(score) = score {
            entry.2 += score;
            entry.3 += 1;
        }
    }

    fn finish(self) -> FrequencyTable {
        FrequencyTable {
            counts: self
                .entries
                .into_iter()
                .map(|(category, count, score_sum, scored)| CategoryCount {
                    category,
                    count,
                    mean_score: (scored > 0).then(|| score_sum / scored as f64),
                })
                .collect(),
        }
    }
}

pub fn build_report(rows: &[LedgerRow], generated_at: DateTime<Utc>) -> String {
    let table = FrequencyTable::from_rows(rows);
    let data = data_rows(rows);

    let mut output = String::new();
    let _ = writeln!(output, "# Bullying Survey Report");
    let _ = writeln!(
        output,
        "Generated {} from {} ledger rows",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        data.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Bullying Type Frequency");

    if table.counts.is_empty() {
        let _ = writeln!(output, "No submissions recorded yet.");
    } else {
        for entry in &table.counts {
            match entry.mean_score {
                Some(mean) => {
                    let _ = writeln!(
                        output,
                        "- {}: {} submissions (mean predicted score {:.2})",
                        entry.category, entry.count, mean
                    );
                }
                None => {
                    let _ = writeln!(output, "- {}: {} submissions", entry.category, entry.count);
                }
            }
        }
        let _ = writeln!(output);
        if let Some(most) = table.most_common() {
            let _ = writeln!(output, "Most common: {} ({})", most.category, most.count);
        }
        if let Some(least) = table.least_common() {
            let _ = writeln!(output, "Least common: {} ({})", least.category, least.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Submissions");

    let recent: Vec<Record> = data
        .iter()
        .rev()
        .filter_map(|row| Record::from_row(row))
        .take(5)
        .collect();
    if recent.is_empty() {
        let _ = writeln!(output, "No submissions recorded yet.");
    } else {
        for record in recent {
            let _ = writeln!(
                output,
                "- #{} {} ({}, grade {}): {} bullying, predicted score {:.2}",
                record.id,
                record.name,
                record.gender,
                record.grade_level,
                record.bullying_category,
                record.predicted_score
            );
        }
    }

    output
}

/// Full ledger download. An empty store still produces the header line.
pub fn write_ledger_csv<W: Write>(rows: &[LedgerRow], writer: W) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);
    writer.write_record(LEDGER_HEADER)?;
    for row in data_rows(rows) {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_frequency_csv<W: Write>(table: &FrequencyTable, writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["Bullying Type", "Count"])?;
    for entry in &table.counts {
        let count = entry.count.to_string();
        writer.write_record([entry.category.as_str(), count.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 600;

const BAR_COLORS: [RGBColor; 5] = [
    RGBColor(0, 0, 255),
    RGBColor(255, 0, 0),
    RGBColor(0, 128, 0),
    RGBColor(128, 0, 128),
    RGBColor(255, 165, 0),
];

fn column_label(table: &FrequencyTable, value: &SegmentValue<usize>) -> String {
    match value {
        SegmentValue::CenterOf(index) => table
            .counts
            .get(*index)
            .map(|entry| entry.category.clone())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// One labelled column per category in first-seen order, colours cycling
/// through [`BAR_COLORS`].
fn draw_chart<DB>(table: &FrequencyTable, root: &DrawingArea<DB, Shift>) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let columns = table.counts.len().max(1);
    let max = table.counts.iter().map(|entry| entry.count).max().unwrap_or(0);

    let mut chart = ChartBuilder::on(root)
        .caption("Submissions by Bullying Type", ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0..columns).into_segmented(), 0..max + 1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(columns)
        .x_label_formatter(&|value| column_label(table, value))
        .x_desc("Bullying type")
        .y_desc("Submissions")
        .draw()?;

    chart.draw_series(table.counts.iter().enumerate().map(|(index, entry)| {
        let color = BAR_COLORS[index % BAR_COLORS.len()];
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(index), 0),
                (SegmentValue::Exact(index + 1), entry.count),
            ],
            color.filled(),
        );
        bar.set_margin(0, 0, 12, 12);
        bar
    }))?;

    root.present()?;
    Ok(())
}

/// Writes the chart as an image; the format follows the file extension.
pub fn save_chart(table: &FrequencyTable, path: &Path) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    draw_chart(table, &root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{header_row, Gender, Record};
    use chrono::TimeZone;

    fn row(id: u64, category: BullyingCategory, score: f64) -> LedgerRow {
        Record {
            id,
            name: format!("Student {id}"),
            gender: Gender::Male,
            age: 12,
            grade_level: 6,
            bullying_severity: 5,
            social_support: 5,
            mental_health: 5,
            bullying_category: category,
            predicted_score: score,
        }
        .to_row()
    }

    #[test]
    fn counts_and_extremes_follow_first_appearance() {
        let table = FrequencyTable::from_categories(["A", "B", "A", "C", "A", "B"]);
        let counts: Vec<(&str, usize)> = table
            .counts
            .iter()
            .map(|entry| (entry.category.as_str(), entry.count))
            .collect();
        assert_eq!(counts, vec![("A", 3), ("B", 2), ("C", 1)]);
        assert_eq!(table.most_common().map(|e| e.category.as_str()), Some("A"));
        assert_eq!(table.least_common().map(|e| e.category.as_str()), Some("C"));
        assert_eq!(table.total(), 6);
    }

    #[test]
    fn ties_go_to_the_earliest_category() {
        let table = FrequencyTable::from_categories(["Y", "X", "X", "Y", "Z", "W"]);
        assert_eq!(table.most_common().map(|e| e.category.as_str()), Some("Y"));
        assert_eq!(table.least_common().map(|e| e.category.as_str()), Some("Z"));
    }

    #[test]
    fn empty_ledger_has_no_extremes() {
        let table = FrequencyTable::from_rows(&[header_row()]);
        assert!(table.counts.is_empty());
        assert!(table.most_common().is_none());
        assert!(table.least_common().is_none());
    }

    #[test]
    fn rows_are_grouped_with_mean_scores() {
        let mut corrupt = row(4, BullyingCategory::Verbal, 0.0);
        corrupt[SCORE_COLUMN] = "n/a".to_string();
        let mut legacy = row(5, BullyingCategory::Verbal, 0.0);
        legacy[CATEGORY_COLUMN] = " fisik ".to_string();
        legacy[SCORE_COLUMN] = "40".to_string();
        let mut blank = row(6, BullyingCategory::Verbal, 0.0);
        blank[CATEGORY_COLUMN] = String::new();

        let rows = vec![
            header_row(),
            row(1, BullyingCategory::Physical, 60.0),
            row(2, BullyingCategory::Verbal, 70.0),
            row(3, BullyingCategory::Verbal, 80.0),
            corrupt,
            legacy,
            blank,
        ];
        let table = FrequencyTable::from_rows(&rows);
        assert_eq!(
            table.counts,
            vec![
                CategoryCount {
                    category: "Physical".to_string(),
                    count: 2,
                    mean_score: Some(50.0),
                },
                CategoryCount {
                    category: "Verbal".to_string(),
                    count: 3,
                    mean_score: Some(75.0),
                },
            ]
        );
    }

    #[test]
    fn report_lists_frequency_and_recent_rows() {
        let rows = vec![
            header_row(),
            row(1, BullyingCategory::Cyber, 55.0),
            row(2, BullyingCategory::Cyber, 65.0),
            row(3, BullyingCategory::Social, 80.0),
        ];
        let generated = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let report = build_report(&rows, generated);

        assert!(report.contains("Generated 2026-03-01 09:30 UTC from 3 ledger rows"));
        assert!(report.contains("- Cyber: 2 submissions (mean predicted score 60.00)"));
        assert!(report.contains("Most common: Cyber (2)"));
        assert!(report.contains("Least common: Social (1)"));
        let newest = report.find("#3 Student 3").expect("newest row listed");
        let oldest = report.find("#1 Student 1").expect("oldest row listed");
        assert!(newest < oldest);
    }

    #[test]
    fn report_on_empty_ledger() {
        let generated = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let report = build_report(&[], generated);
        assert!(report.contains("No submissions recorded yet."));
    }

    #[test]
    fn ledger_export_always_has_header() {
        let mut buffer = Vec::new();
        write_ledger_csv(&[], &mut buffer).expect("export");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text.trim_end(), LEDGER_HEADER.join(","));

        let rows = vec![header_row(), row(1, BullyingCategory::Sexual, 42.5)];
        let mut buffer = Vec::new();
        write_ledger_csv(&rows, &mut buffer).expect("export");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap_or("").starts_with("1,Student 1,Male"));
    }

    #[test]
    fn frequency_export_is_two_columns() {
        let table = FrequencyTable::from_categories(["Verbal", "Cyber", "Verbal"]);
        let mut buffer = Vec::new();
        write_frequency_csv(&table, &mut buffer).expect("export");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text, "Bullying Type,Count\nVerbal,2\nCyber,1\n");
    }

    fn bar_pixels(table: &FrequencyTable) -> Vec<usize> {
        let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
                .into_drawing_area();
            draw_chart(table, &root).expect("draw");
        }
        BAR_COLORS
            .iter()
            .map(|color| {
                buffer
                    .chunks_exact(3)
                    .filter(|pixel| *pixel == [color.0, color.1, color.2])
                    .count()
            })
            .collect()
    }

    #[test]
    fn chart_bars_scale_to_largest_count() {
        let table = FrequencyTable::from_categories(["Verbal", "Verbal", "Cyber"]);
        let pixels = bar_pixels(&table);
        assert!(pixels[1] > 0);
        assert!(pixels[0] > pixels[1] * 3 / 2);
        assert_eq!(&pixels[2..], &[0, 0, 0]);
    }

    #[test]
    fn chart_colours_cycle_past_five_categories() {
        let table = FrequencyTable::from_categories(["A", "B", "C", "D", "E", "F"]);
        let pixels = bar_pixels(&table);
        assert!(pixels.iter().all(|count| *count > 0));
        // the sixth column reuses the first colour
        assert!(pixels[0] > pixels[1] * 3 / 2);
    }

    #[test]
    fn columns_are_labelled_by_category() {
        let table = FrequencyTable::from_categories(["Verbal", "Cyber"]);
        assert_eq!(column_label(&table, &SegmentValue::CenterOf(0)), "Verbal");
        assert_eq!(column_label(&table, &SegmentValue::CenterOf(1)), "Cyber");
        assert_eq!(column_label(&table, &SegmentValue::Exact(1)), "");
        assert_eq!(column_label(&table, &SegmentValue::CenterOf(2)), "");
    }

    #[test]
    fn saved_chart_is_a_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chart.png");
        save_chart(&FrequencyTable::default(), &path).expect("save");
        let bytes = std::fs::read(&path).expect("read back");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
