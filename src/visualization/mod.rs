//! Diagnostic plots for processed station sets.
//!
//! This module renders PNG figures with the plotters library:
//! - slope distance over time
//! - easting, northing and elevation panels
//! - easting and northing on a single panel
//! - map-plane scatter coloured by elapsed time, one cell per station
//!
//! Time axes are plotted as hours since the earliest sample in the figure
//! and labelled back as local dates.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::{PlotWindow, SurveyConfig};
use crate::core::loaders::{LoaderError, SurveyTable};
use crate::core::transforms::{relative_to_first_valid, seconds_between, seconds_since_start};
use crate::processors::stations::StationSet;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("No station has data in the requested range")]
    EmptySet,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Station colours, cycled by station order.
const STATION_COLORS: &[(u8, u8, u8)] = &[
    (8, 69, 148),    // dark blue
    (255, 127, 0),   // orange
    (152, 78, 163),  // violet
    (228, 26, 28),   // red
    (77, 175, 74),   // green
    (55, 126, 184),  // light blue
    (251, 154, 153), // light red
    (253, 191, 111), // light orange
    (202, 178, 214), // light violet
    (165, 42, 42),   // brown
    (255, 192, 203), // pink
    (128, 128, 128), // grey
    (0, 0, 0),       // black
];

/// Anchor colours of the viridis map, evenly spaced.
const VIRIDIS: &[(u8, u8, u8)] = &[
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

/// Figure sizes in inches.
const SLOPE_FIGSIZE: (u32, u32) = (16, 10);
const ENE_FIGSIZE: (u32, u32) = (16, 12);
const EN_FIGSIZE: (u32, u32) = (12, 8);
const MAPPLANE_FIGSIZE: (u32, u32) = (18, 12);

/// Rows in the map-plane grid.
const MAPPLANE_ROWS: usize = 3;

/// Number of colour steps drawn in a colour bar.
const COLORBAR_STEPS: usize = 64;

/// Rendering options shared by all plots.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub dpi: u32,
    pub hour_interval: u32,
    pub time_label: String,
}

impl PlotOptions {
    pub fn from_config(config: &SurveyConfig) -> Self {
        Self {
            dpi: config.plot.dpi,
            hour_interval: config.plot.hour_interval,
            time_label: config.time.local_label.clone(),
        }
    }

    fn figure_size(&self, inches: (u32, u32)) -> (u32, u32) {
        (inches.0 * self.dpi, inches.1 * self.dpi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Dot,
    Cross,
}

/// One series drawn on a time panel.
struct PanelSeries {
    label: Option<String>,
    color: RGBColor,
    marker: Marker,
    points: Vec<(f64, f64)>,
}

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Colour of the k-th station.
fn station_color(k: usize) -> RGBColor {
    let (r, g, b) = STATION_COLORS[k % STATION_COLORS.len()];
    RGBColor(r, g, b)
}

/// Viridis colour for `t` in [0, 1].
fn viridis(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - i as f64;
    let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
    let lerp = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// Rows and columns of the map-plane grid for `n` stations.
fn grid_shape(n: usize) -> (usize, usize) {
    let cols = ((n + MAPPLANE_ROWS - 1) / MAPPLANE_ROWS).max(1);
    (MAPPLANE_ROWS, cols)
}

/// Colour bar label; the start time is left out when the grid gets crowded.
fn colorbar_label(n_plots: usize, start: NaiveDateTime) -> String {
    if n_plots > 6 {
        "hours".to_string()
    } else {
        format!("hours since {}", start.format("%a %b %e %H:%M:%S %Y"))
    }
}

/// Number of x labels for a span of hours at the configured tick interval.
fn x_label_count(span_hours: f64, interval: u32) -> usize {
    let interval = interval.max(1) as f64;
    ((span_hours / interval).ceil() as usize + 1).clamp(2, 30)
}

/// Format hours since `t0` as a local date label.
fn time_label(t0: NaiveDateTime, hours: f64) -> String {
    let t = t0 + Duration::milliseconds((hours * 3_600_000.0).round() as i64);
    t.format("%m-%d %H:%M").to_string()
}

/// Compute padded bounds (min/max) for x and y coordinates.
fn compute_bounds<I>(points: I) -> Option<(f64, f64, f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;
    let mut any = false;

    for (x, y) in points {
        if x.is_nan() || y.is_nan() {
            continue;
        }
        any = true;
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if !any {
        return None;
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;
    Some((x_min - x_padding, x_max + x_padding, y_min - y_padding, y_max + y_padding))
}

/// Stations truncated to the window, paired with their colour index.
/// Stations with no rows in the window are skipped.
fn windowed<'a>(set: &'a StationSet, window: Option<&PlotWindow>) -> Vec<(usize, &'a str, SurveyTable)> {
    set.iter()
        .enumerate()
        .filter_map(|(k, (key, table))| {
            let truncated = match window {
                Some(w) => table.truncate(Some(w.start), Some(w.end)),
                None => table.clone(),
            };
            (!truncated.is_empty()).then(|| (k, key.as_str(), truncated))
        })
        .collect()
}

/// Indexes of panels with at least one point to draw.
fn panels_with_data(panels: &[Vec<PanelSeries>]) -> Vec<usize> {
    panels
        .iter()
        .enumerate()
        .filter(|(_, series)| series.iter().any(|s| !s.points.is_empty()))
        .map(|(m, _)| m)
        .collect()
}

/// Earliest timestamp across tables.
fn time_origin(tables: &[(usize, &str, SurveyTable)]) -> Option<NaiveDateTime> {
    tables.iter().filter_map(|(_, _, t)| t.times.first().copied()).min()
}

/// `(hours since t0, value minus first valid value)`, skipping missing values.
fn relative_points(table: &SurveyTable, column: &str, t0: NaiveDateTime) -> Result<Vec<(f64, f64)>> {
    let values = relative_to_first_valid(table.require(column)?);
    Ok(table
        .times
        .iter()
        .zip(values)
        .filter(|(_, v)| !v.is_nan())
        .map(|(&t, v)| (seconds_between(t0, t) / 3600.0, v))
        .collect())
}

fn draw_time_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    series: &[PanelSeries],
    t0: NaiveDateTime,
    y_desc: &str,
    show_x_labels: bool,
    legend: Option<SeriesLabelPosition>,
    options: &PlotOptions,
) -> Result<()> {
    let (x_min, x_max, y_min, y_max) =
        compute_bounds(series.iter().flat_map(|s| s.points.iter().copied()))
            .ok_or(VisualizationError::EmptySet)?;

    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .x_label_area_size(if show_x_labels { 70 } else { 10 })
        .y_label_area_size(90)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_err)?;

    let format_time = |h: &f64| time_label(t0, *h);
    let hide_time = |_: &f64| String::new();
    let x_desc = format!("date [{}]", options.time_label);

    {
        let mut mesh = chart.configure_mesh();
        mesh.disable_y_mesh()
            .x_labels(x_label_count(x_max - x_min, options.hour_interval))
            .y_desc(y_desc);
        if show_x_labels {
            mesh.x_label_formatter(&format_time).x_desc(x_desc.as_str());
        } else {
            mesh.x_label_formatter(&hide_time);
        }
        mesh.draw().map_err(plot_err)?;
    }

    for s in series {
        let color = s.color;
        let anno = match s.marker {
            Marker::Dot => chart.draw_series(
                s.points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
            ),
            Marker::Cross => chart.draw_series(
                s.points
                    .iter()
                    .map(|&(x, y)| Cross::new((x, y), 4, color.stroke_width(1))),
            ),
        }
        .map_err(plot_err)?;

        if let Some(label) = &s.label {
            anno.label(label.as_str())
                .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
        }
    }

    if let Some(position) = legend {
        chart
            .configure_series_labels()
            .position(position)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }

    Ok(())
}

/// Plot slope distance relative to its first value, one series per station.
pub fn plot_slope_distance(
    set: &StationSet,
    output_path: &Path,
    window: Option<&PlotWindow>,
    options: &PlotOptions,
) -> Result<()> {
    let tables = windowed(set, window);
    let t0 = time_origin(&tables).ok_or(VisualizationError::EmptySet)?;

    let mut series = Vec::with_capacity(tables.len());
    for (k, key, table) in &tables {
        series.push(PanelSeries {
            label: Some(key.to_string()),
            color: station_color(*k),
            marker: Marker::Dot,
            points: relative_points(table, "slope_distance", t0)?,
        });
    }

    let root = BitMapBackend::new(output_path, options.figure_size(SLOPE_FIGSIZE)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    draw_time_panel(
        &root,
        &series,
        t0,
        "slope distance [m]",
        true,
        Some(SeriesLabelPosition::UpperLeft),
        options,
    )?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Three stacked panels: easting, northing and elevation.
pub fn plot_easting_northing_elevation(
    set: &StationSet,
    output_path: &Path,
    window: Option<&PlotWindow>,
    options: &PlotOptions,
) -> Result<()> {
    const VARIABLES: [&str; 3] = ["easting", "northing", "elevation"];

    let tables = windowed(set, window);
    let t0 = time_origin(&tables).ok_or(VisualizationError::EmptySet)?;

    let mut panel_series = Vec::with_capacity(VARIABLES.len());
    for var in VARIABLES {
        let mut series = Vec::with_capacity(tables.len());
        for (k, key, table) in &tables {
            series.push(PanelSeries {
                label: Some(key.to_string()),
                color: station_color(*k),
                marker: Marker::Dot,
                points: relative_points(table, var, t0)?,
            });
        }
        panel_series.push(series);
    }

    let drawn = panels_with_data(&panel_series);
    let last = *drawn.last().ok_or(VisualizationError::EmptySet)?;

    let root = BitMapBackend::new(output_path, options.figure_size(ENE_FIGSIZE)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let panels = root.split_evenly((VARIABLES.len(), 1));

    for (m, (var, series)) in VARIABLES.iter().zip(&panel_series).enumerate() {
        if !drawn.contains(&m) {
            warn!("{}: no {} values to plot, leaving the panel empty", output_path.display(), var);
            continue;
        }
        let labelled = m == last;
        draw_time_panel(
            &panels[m],
            series,
            t0,
            var,
            labelled,
            labelled.then_some(SeriesLabelPosition::LowerRight),
            options,
        )?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Easting (dots) and northing (crosses) on one panel.
pub fn plot_easting_northing(
    set: &StationSet,
    output_path: &Path,
    window: Option<&PlotWindow>,
    options: &PlotOptions,
) -> Result<()> {
    let tables = windowed(set, window);
    let t0 = time_origin(&tables).ok_or(VisualizationError::EmptySet)?;

    let mut series = Vec::with_capacity(tables.len() * 2);
    for (k, key, table) in &tables {
        series.push(PanelSeries {
            label: Some(key.to_string()),
            color: station_color(*k),
            marker: Marker::Dot,
            points: relative_points(table, "easting", t0)?,
        });
        series.push(PanelSeries {
            label: None,
            color: station_color(*k),
            marker: Marker::Cross,
            points: relative_points(table, "northing", t0)?,
        });
    }

    let root = BitMapBackend::new(output_path, options.figure_size(EN_FIGSIZE)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    draw_time_panel(
        &root,
        &series,
        t0,
        "displacement [m]",
        true,
        Some(SeriesLabelPosition::UpperLeft),
        options,
    )?;

    root.present().map_err(plot_err)?;
    Ok(())
}

fn draw_mapplane_cell(
    cell: &DrawingArea<BitMapBackend<'_>, Shift>,
    key: &str,
    table: &SurveyTable,
    bar_label: &str,
) -> Result<()> {
    let easting = table.require("easting")?;
    let northing = table.require("northing")?;
    let hours: Vec<f64> = seconds_since_start(&table.times)
        .into_iter()
        .map(|s| s / 3600.0)
        .collect();

    let points: Vec<(f64, f64, f64)> = easting
        .iter()
        .zip(northing)
        .zip(&hours)
        .filter(|((e, n), _)| !e.is_nan() && !n.is_nan())
        .map(|((&e, &n), &h)| (e, n, h))
        .collect();

    let Some((x_min, x_max, y_min, y_max)) = compute_bounds(points.iter().map(|&(e, n, _)| (e, n))) else {
        warn!("{}: no complete easting/northing pairs to plot", key);
        return Ok(());
    };
    let max_hours = hours.last().copied().filter(|&h| h > 0.0).unwrap_or(1.0);

    let (width, _) = cell.dim_in_pixel();
    let (plot_area, bar_area) = cell.split_horizontally((width as f64 * 0.85) as i32);

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(key, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(5)
        .x_desc("easting [m]")
        .y_desc("northing [m]")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&(e, n, h)| Circle::new((e, n), 4, viridis(h / max_hours).filled())),
        )
        .map_err(plot_err)?;

    let mut bar = ChartBuilder::on(&bar_area)
        .margin(10)
        .margin_top(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..1.0, 0.0..max_hours)
        .map_err(plot_err)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc(bar_label)
        .draw()
        .map_err(plot_err)?;

    bar.draw_series((0..COLORBAR_STEPS).map(|i| {
        let lo = max_hours * i as f64 / COLORBAR_STEPS as f64;
        let hi = max_hours * (i + 1) as f64 / COLORBAR_STEPS as f64;
        let color = viridis(i as f64 / (COLORBAR_STEPS - 1) as f64);
        Rectangle::new([(0.0, lo), (1.0, hi)], color.filled())
    }))
    .map_err(plot_err)?;

    Ok(())
}

/// Map-plane scatter of every station, coloured by hours since its first sample.
pub fn plot_mapplane(
    set: &StationSet,
    output_path: &Path,
    window: Option<&PlotWindow>,
    options: &PlotOptions,
) -> Result<()> {
    let tables = windowed(set, window);
    if tables.is_empty() {
        return Err(VisualizationError::EmptySet);
    }

    let root = BitMapBackend::new(output_path, options.figure_size(MAPPLANE_FIGSIZE)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let cells = root.split_evenly(grid_shape(tables.len()));
    for ((_, key, table), cell) in tables.iter().zip(&cells) {
        let label = colorbar_label(tables.len(), table.times[0]);
        draw_mapplane_cell(cell, key, table, &label)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Render every plot for the full range and for each configured window.
///
/// A window without data is skipped with a warning. Returns the files written.
pub fn render_all(set: &StationSet, output_dir: &Path, config: &SurveyConfig) -> Result<Vec<PathBuf>> {
    if set.is_empty() {
        return Err(VisualizationError::EmptySet);
    }
    fs::create_dir_all(output_dir)?;

    let options = PlotOptions::from_config(config);
    let windows: Vec<(String, Option<&PlotWindow>)> = std::iter::once(("full".to_string(), None))
        .chain(config.plot.windows.iter().map(|w| (w.name.clone(), Some(w))))
        .collect();

    type PlotFn = fn(&StationSet, &Path, Option<&PlotWindow>, &PlotOptions) -> Result<()>;
    let plots: [(&str, PlotFn); 4] = [
        ("slope_distance", plot_slope_distance),
        ("ts_ene", plot_easting_northing_elevation),
        ("ts_en", plot_easting_northing),
        ("mapplane", plot_mapplane),
    ];

    let mut written = Vec::new();
    for (suffix, window) in &windows {
        for (prefix, plot) in &plots {
            let path = output_dir.join(format!("{}_{}.png", prefix, suffix));
            match plot(set, &path, *window, &options) {
                Ok(()) => {
                    info!("Wrote {}", path.display());
                    written.push(path);
                }
                Err(VisualizationError::EmptySet) => {
                    warn!("Skipping {}: no data in window '{}'", path.display(), suffix);
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(written)
}
