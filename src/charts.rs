//! PNG chart rendering
//!
//! Three figures are written per run, each overwriting the previous file:
//! flow and packet counts over time, the correlation heatmap, and the flow
//! series with its flagged rows overlaid.
//!
//! Text (titles, axis labels, annotations) needs a TrueType font. One is
//! registered at startup from the configured path or a well-known system
//! location; without one the charts are still drawn, just unlabelled.

use crate::anomaly::MetricAnomalies;
use crate::dataset::{ColumnSlot, MergedTable};
use crate::stats::CorrelationMatrix;
use chrono::{DateTime, Utc};
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

pub const FLOWS_PACKETS_FILE: &str = "flows_packets_over_time.png";
pub const HEATMAP_FILE: &str = "correlation_heatmap.png";
pub const ANOMALIES_FILE: &str = "anomalies_in_flows.png";

const FONT_FAMILY: &str = "sans-serif";

fn font(size: f64) -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, size, FontStyle::Normal)
}

/// Fonts tried when no font path is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

// matplotlib's default cycle, first two entries
const FLOWS_COLOR: RGBColor = RGBColor(31, 119, 180);
const PACKETS_COLOR: RGBColor = RGBColor(255, 127, 14);
const ANOMALY_COLOR: RGBColor = RGBColor(214, 39, 40);

/// Errors raised while drawing a figure
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Cannot render {chart}: the merged table has no rows")]
    EmptyFrame { chart: &'static str },

    #[error("Failed to render {path}: {message}")]
    Render { path: PathBuf, message: String },
}

fn render_error<E: Display>(path: &Path, e: E) -> ChartError {
    ChartError::Render {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

static FONT_READY: OnceLock<bool> = OnceLock::new();

/// Register a font for chart text; returns whether text can be drawn
///
/// Only the first call in a process has any effect.
pub fn init_font(font_path: Option<&Path>) -> bool {
    *FONT_READY.get_or_init(|| {
        let candidates = font_path
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

        for candidate in candidates {
            let Ok(bytes) = std::fs::read(&candidate) else {
                continue;
            };
            // plotters keeps a 'static reference to registered font data
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            match plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
                Ok(()) => {
                    debug!(font = %candidate.display(), "registered chart font");
                    return true;
                }
                Err(_) => warn!(font = %candidate.display(), "not a usable TrueType font"),
            }
        }

        warn!("no TrueType font found; charts will be rendered without text");
        false
    })
}

/// Seconds since the epoch as a plotting coordinate
fn epoch_seconds(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) * 1e-9
}

fn format_axis_time(x: f64) -> String {
    DateTime::from_timestamp(x.floor() as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Runs of consecutive rows that have both a timestamp and a value
///
/// A row without either breaks the line, as a missing point does on a
/// matplotlib axis.
pub fn time_segments(table: &MergedTable, slot: ColumnSlot) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for record in &table.records {
        match (record.time.as_ref(), record.flow.value(slot)) {
            (Some(ts), Some(value)) => current.push((epoch_seconds(ts), value)),
            _ => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn time_range(table: &MergedTable) -> (f64, f64) {
    let times = table.records.iter().filter_map(|r| r.time.as_ref()).map(epoch_seconds);
    let (min, max) = times.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
        (lo.min(t), hi.max(t))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        // One 10-minute bucket either side
        return (min - 600.0, max + 600.0);
    }
    (min, max)
}

fn value_range<'a>(series: impl IntoIterator<Item = &'a [(f64, f64)]>) -> (f64, f64) {
    let (min, max) = series
        .into_iter()
        .flatten()
        .map(|p| p.1)
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    let lo = min.min(0.0);
    let hi = if max > lo { max + (max - lo) * 0.05 } else { lo + 1.0 };
    (lo, hi)
}

/// Coolwarm diverging colour for a coefficient in [-1, 1]
pub fn coolwarm(r: f64) -> RGBColor {
    const COOL: (f64, f64, f64) = (59.0, 76.0, 192.0);
    const MID: (f64, f64, f64) = (221.0, 221.0, 221.0);
    const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);

    let r = r.clamp(-1.0, 1.0);
    let (from, to, t) = if r < 0.0 { (COOL, MID, r + 1.0) } else { (MID, WARM, r) };
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    RGBColor(lerp(from.0, to.0), lerp(from.1, to.1), lerp(from.2, to.2))
}

fn annotation_color(background: RGBColor) -> RGBColor {
    let RGBColor(r, g, b) = background;
    let luminance = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
    if luminance < 128.0 {
        WHITE
    } else {
        BLACK
    }
}

/// Draws the three analysis figures
#[derive(Debug, Clone, Copy)]
pub struct ChartRenderer {
    text: bool,
}

impl ChartRenderer {
    /// Renderer that labels charts when a font can be registered
    pub fn new(font_path: Option<&Path>) -> Self {
        Self {
            text: init_font(font_path),
        }
    }

    /// Renderer that never draws text
    pub fn without_text() -> Self {
        Self { text: false }
    }

    /// Line chart of `n_flows` and `n_packets` against time
    pub fn flows_and_packets(&self, table: &MergedTable, path: &Path) -> Result<(), ChartError> {
        if table.is_empty() {
            return Err(ChartError::EmptyFrame {
                chart: "flows/packets time series",
            });
        }

        let flows = time_segments(table, ColumnSlot::Flows);
        let packets = time_segments(table, ColumnSlot::Packets);
        let (x0, x1) = time_range(table);
        let (y0, y1) = value_range(flows.iter().chain(&packets).map(Vec::as_slice));

        let root = BitMapBackend::new(path, (1400, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| render_error(path, e))?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if self.text {
            builder
                .caption("Flows and Packets Over Time", font(26.0))
                .x_label_area_size(60)
                .y_label_area_size(90);
        }
        let mut chart = builder
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(|e| render_error(path, e))?;

        if self.text {
            chart
                .configure_mesh()
                .x_desc("Time")
                .y_desc("Count")
                .x_labels(8)
                .x_label_formatter(&|x| format_axis_time(*x))
                .draw()
                .map_err(|e| render_error(path, e))?;
        }

        for (segments, color, label) in [
            (&flows, FLOWS_COLOR, "Number of Flows"),
            (&packets, PACKETS_COLOR, "Number of Packets"),
        ] {
            for (i, segment) in segments.iter().enumerate() {
                let series = chart
                    .draw_series(LineSeries::new(segment.iter().copied(), color.stroke_width(2)))
                    .map_err(|e| render_error(path, e))?;
                if i == 0 {
                    series.label(label).legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
                }
            }
        }

        if self.text {
            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(|e| render_error(path, e))?;
        }

        root.present().map_err(|e| render_error(path, e))?;
        debug!(path = %path.display(), "rendered flows/packets chart");
        Ok(())
    }

    /// Annotated heatmap of the correlation matrix
    pub fn correlation_heatmap(
        &self,
        matrix: &CorrelationMatrix,
        path: &Path,
    ) -> Result<(), ChartError> {
        let n = matrix.size();
        if n == 0 {
            return Err(ChartError::EmptyFrame {
                chart: "correlation heatmap",
            });
        }
        let size = n as f64;

        let root = BitMapBackend::new(path, (1200, 800)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| render_error(path, e))?;

        let mut builder = ChartBuilder::on(&root);
        builder
            .margin_top(20)
            .margin_left(if self.text { 170 } else { 20 })
            .margin_bottom(if self.text { 90 } else { 20 })
            .margin_right(150);
        if self.text {
            builder.caption("Feature Correlation Heatmap", font(26.0));
        }
        let mut chart = builder
            .build_cartesian_2d(0.0..size, 0.0..size)
            .map_err(|e| render_error(path, e))?;

        // Row 0 at the top
        let cell = |row: usize, col: usize| {
            let y = size - row as f64;
            ((col as f64, y - 1.0), (col as f64 + 1.0, y))
        };

        let mut cells = Vec::new();
        for row in 0..n {
            for col in 0..n {
                if let Some(r) = matrix.get(row, col) {
                    let (lo, hi) = cell(row, col);
                    cells.push(Rectangle::new([lo, hi], coolwarm(r).filled()));
                }
            }
        }
        chart.draw_series(cells).map_err(|e| render_error(path, e))?;

        if self.text {
            let font_size = if n > 12 { 10.0 } else { 15.0 };
            let mut labels = Vec::new();
            for row in 0..n {
                for col in 0..n {
                    if let Some(r) = matrix.get(row, col) {
                        let ((x0, y0), _) = cell(row, col);
                        let style = font(font_size)
                            .color(&annotation_color(coolwarm(r)))
                            .pos(Pos::new(HPos::Center, VPos::Center));
                        labels.push(Text::new(format!("{:.2}", r), (x0 + 0.5, y0 + 0.5), style));
                    }
                }
            }
            chart.draw_series(labels).map_err(|e| render_error(path, e))?;

            let axis_style = font(14.0).color(&BLACK);
            for (i, name) in matrix.columns.iter().enumerate() {
                let (px, py) = chart.backend_coord(&(i as f64 + 0.5, 0.0));
                root.draw(&Text::new(
                    name.as_str(),
                    (px, py + 8),
                    axis_style.pos(Pos::new(HPos::Center, VPos::Top)),
                ))
                .map_err(|e| render_error(path, e))?;

                let (px, py) = chart.backend_coord(&(0.0, size - i as f64 - 0.5));
                root.draw(&Text::new(
                    name.as_str(),
                    (px - 8, py),
                    axis_style.pos(Pos::new(HPos::Right, VPos::Center)),
                ))
                .map_err(|e| render_error(path, e))?;
            }
        }

        let bottom_right = chart.backend_coord(&(size, 0.0));
        let top_right = chart.backend_coord(&(size, size));
        self.draw_colorbar(&root, bottom_right, top_right)
            .map_err(|e| render_error(path, e))?;

        root.present().map_err(|e| render_error(path, e))?;
        debug!(path = %path.display(), columns = n, "rendered correlation heatmap");
        Ok(())
    }

    /// Vertical -1..1 colour scale to the right of the heatmap
    fn draw_colorbar<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
        bottom_right: (i32, i32),
        top_right: (i32, i32),
    ) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        let left = bottom_right.0 + 30;
        let right = left + 24;
        let (top, bottom) = (top_right.1, bottom_right.1);
        let height = (bottom - top).max(1);

        for offset in 0..height {
            let r = 1.0 - 2.0 * f64::from(offset) / f64::from(height);
            root.draw(&Rectangle::new(
                [(left, top + offset), (right, top + offset + 1)],
                coolwarm(r).filled(),
            ))?;
        }
        root.draw(&Rectangle::new([(left, top), (right, bottom)], BLACK.stroke_width(1)))?;

        if self.text {
            let style = font(14.0).color(&BLACK);
            for (r, y) in [(1.0, top), (0.0, (top + bottom) / 2), (-1.0, bottom)] {
                root.draw(&Text::new(
                    format!("{:.2}", r),
                    (right + 6, y),
                    style.pos(Pos::new(HPos::Left, VPos::Center)),
                ))?;
            }
        }
        Ok(())
    }

    /// `n_flows` over time with the flagged flow rows marked
    pub fn anomalies_in_flows(
        &self,
        table: &MergedTable,
        flagged: &MetricAnomalies,
        path: &Path,
    ) -> Result<(), ChartError> {
        if table.is_empty() {
            return Err(ChartError::EmptyFrame {
                chart: "flow anomalies",
            });
        }

        let flows = time_segments(table, ColumnSlot::Flows);
        let markers: Vec<(f64, f64)> = flagged
            .flagged
            .iter()
            .filter_map(|hit| {
                let ts = table.records.get(hit.row)?.time.as_ref()?;
                Some((epoch_seconds(ts), hit.value))
            })
            .collect();

        let (x0, x1) = time_range(table);
        let (y0, y1) = value_range(flows.iter().map(Vec::as_slice));

        let root = BitMapBackend::new(path, (1400, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| render_error(path, e))?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if self.text {
            builder
                .caption("Anomalies in Network Flows", font(26.0))
                .x_label_area_size(60)
                .y_label_area_size(90);
        }
        let mut chart = builder
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(|e| render_error(path, e))?;

        if self.text {
            chart
                .configure_mesh()
                .x_desc("Time")
                .y_desc("Flow Count")
                .x_labels(8)
                .x_label_formatter(&|x| format_axis_time(*x))
                .draw()
                .map_err(|e| render_error(path, e))?;
        }

        for (i, segment) in flows.iter().enumerate() {
            let series = chart
                .draw_series(LineSeries::new(
                    segment.iter().copied(),
                    FLOWS_COLOR.stroke_width(2),
                ))
                .map_err(|e| render_error(path, e))?;
            if i == 0 {
                series.label("Flows").legend(|(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], FLOWS_COLOR.stroke_width(2))
                });
            }
        }

        let scatter = chart
            .draw_series(
                markers
                    .iter()
                    .map(|&point| Circle::new(point, 5, ANOMALY_COLOR.filled())),
            )
            .map_err(|e| render_error(path, e))?;
        if !markers.is_empty() {
            scatter
                .label("Anomalies")
                .legend(|(x, y)| Circle::new((x + 10, y), 5, ANOMALY_COLOR.filled()));
        }

        if self.text {
            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(|e| render_error(path, e))?;
        }

        root.present().map_err(|e| render_error(path, e))?;
        debug!(
            path = %path.display(),
            markers = markers.len(),
            "rendered flow anomalies chart"
        );
        Ok(())
    }
}
