//! Histogram charts embedded next to their tables.
//!
//! Charts are drawn as bars and grid lines only. Titles and legends go into
//! worksheet cells, so rendering needs no system fonts.

use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::stats::Bin;
use super::workbook::Workbook;
use crate::error::{ReportError, ReportResult};
use crate::logs::RunLog;

const STAGE: &str = "report";

/// Pixel size of a rendered chart.
pub const CHART_SIZE: (u32, u32) = (800, 500);

const MARGIN: u32 = 20;
const GRID_LINES: usize = 5;
const GRID: RGBColor = RGBColor(200, 200, 200);

/// Fill colors cycled over the series of one chart.
const SERIES_COLORS: [(RGBColor, &str); 6] = [
    (BLUE, "blue"),
    (RED, "red"),
    (GREEN, "green"),
    (MAGENTA, "magenta"),
    (CYAN, "cyan"),
    (YELLOW, "yellow"),
];

/// One set of bars.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub bins: Vec<Bin>,
}

/// A histogram anchored at a worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub title: String,
    /// Zero-based (row, column) of the image's top-left corner.
    pub anchor: (u32, u16),
    pub series: Vec<Series>,
}

impl Chart {
    pub fn new(title: impl Into<String>, anchor: (u32, u16)) -> Self {
        Self {
            title: title.into(),
            anchor,
            series: Vec::new(),
        }
    }

    pub fn series(mut self, label: impl Into<String>, bins: Vec<Bin>) -> Self {
        self.series.push(Series {
            label: label.into(),
            bins,
        });
        self
    }

    /// No bins at all, nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.bins.is_empty())
    }

    /// Title plus a color legend when there is more than one series.
    pub fn caption(&self) -> String {
        if self.series.len() < 2 {
            return self.title.clone();
        }
        let legend = self
            .series
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{} {}", s.label, series_color(i).1))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} ({legend})", self.title)
    }

    fn x_range(&self) -> Option<(f64, f64)> {
        let bins = self.series.iter().flat_map(|s| s.bins.iter());
        let lo = bins.clone().map(|b| b.lower).reduce(f64::min)?;
        let hi = bins.map(|b| b.upper).reduce(f64::max)?;
        Some((lo, hi))
    }

    fn y_max(&self) -> f64 {
        let top = self
            .series
            .iter()
            .flat_map(|s| s.bins.iter())
            .map(|b| b.count)
            .max()
            .unwrap_or(0);
        (top.max(1) as f64) * 1.05
    }
}

fn series_color(index: usize) -> (RGBColor, &'static str) {
    SERIES_COLORS[index % SERIES_COLORS.len()]
}

/// Render a chart to a PNG file.
pub fn render_png(chart: &Chart, path: &Path) -> ReportResult<()> {
    draw(chart, path).map_err(|e| ReportError::Chart(format!("{}: {e}", chart.title)))
}

fn draw(chart: &Chart, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (x_min, x_max) = chart.x_range().ok_or("no bins to draw")?;
    let y_max = chart.y_max();

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut ctx = ChartBuilder::on(&root)
        .margin(MARGIN)
        .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;

    ctx.draw_series((1..=GRID_LINES).map(|i| {
        let y = y_max * i as f64 / (GRID_LINES as f64 + 1.0);
        PathElement::new(vec![(x_min, y), (x_max, y)], GRID.stroke_width(1))
    }))?;

    for (i, series) in chart.series.iter().enumerate() {
        let fill = series_color(i).0.mix(0.7).filled();
        let bar = |b: &Bin| [(b.lower, 0.0), (b.upper, b.count as f64)];
        ctx.draw_series(series.bins.iter().map(|b| Rectangle::new(bar(b), fill)))?;
        ctx.draw_series(series.bins.iter().map(|b| Rectangle::new(bar(b), BLACK.stroke_width(1))))?;
    }

    ctx.draw_series(std::iter::once(PathElement::new(
        vec![(x_min, y_max), (x_min, 0.0), (x_max, 0.0)],
        BLACK.stroke_width(2),
    )))?;

    root.present()?;
    Ok(())
}

/// Render every non-empty chart of the workbook into `dir`.
///
/// Returns the image path per sheet index.
pub fn render_charts(workbook: &Workbook, dir: &Path, log: &mut RunLog) -> ReportResult<BTreeMap<usize, PathBuf>> {
    let mut images = BTreeMap::new();
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        let Some(chart) = &sheet.chart else { continue };
        if chart.is_empty() {
            log.warning(STAGE, format!("'{}' has no values to chart", sheet.name));
            continue;
        }
        let path = dir.join(format!("{:02}_{}.png", i + 1, sheet.file_stem()));
        render_png(chart, &path)?;
        images.insert(i, path);
    }
    log.info(STAGE, format!("rendered {} charts", images.len()));
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::stats::histogram;
    use crate::report::workbook::Sheet;
    use std::fs;
    use tempfile::tempdir;

    fn bins() -> Vec<Bin> {
        histogram(&[18.0, 19.0, 19.0, 22.0, 30.0], 10)
    }

    #[test]
    fn test_render_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("age.png");
        let chart = Chart::new("Age Distribution", (1, 7)).series("age", bins());

        render_png(&chart, &path).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn test_caption_legend() {
        let single = Chart::new("Term GPA Distribution", (1, 7)).series("gpa", bins());
        assert_eq!(single.caption(), "Term GPA Distribution");

        let overlay = Chart::new("By degree", (1, 9)).series("BA", bins()).series("BS", bins());
        assert_eq!(overlay.caption(), "By degree (BA blue, BS red)");
    }

    #[test]
    fn test_render_charts_skips_empty() {
        let dir = tempdir().unwrap();
        let mut book = Workbook::new();
        book.add(Sheet::new("Persistence rate", &["metric", "value"]));
        book.add(
            Sheet::new("Age distribution", &["stat", "value"])
                .with_chart(Chart::new("Age", (1, 7)).series("age", bins())),
        );
        book.add(
            Sheet::new("GPA distribution", &["stat", "value"])
                .with_chart(Chart::new("GPA", (1, 7)).series("gpa", Vec::new())),
        );

        let mut log = RunLog::new();
        let images = render_charts(&book, dir.path(), &mut log).unwrap();

        assert_eq!(images.len(), 1);
        assert!(images[&1].ends_with("02_age_distribution.png"));
        assert!(images[&1].exists());
        assert_eq!(log.warning_count(), 1);
    }
}
