// src/ui.rs
// Presentation: generalized coordinates to cartesian points, the three-panel result figure, and the
// web handler that runs a simulation and returns the figure plus animation frames.
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;

use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;

use crate::config::SimConfig;
use crate::error::{Error, Result};
use crate::logic::{run_simulation, Trajectory};
use crate::math::N;

/// Points of one frame, in drawing order: base, pivot, mass 1, pivot, mass 2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CartesianFrame {
    pub xs: [f64; 5],
    pub ys: [f64; 5],
}

impl CartesianFrame {
    pub fn point(&self, i: usize) -> (f64, f64) {
        (self.xs[i], self.ys[i])
    }
}

pub const BASE: usize = 0;
pub const PIVOT: usize = 1;
pub const MASS_1: usize = 2;
pub const MASS_2: usize = 4;

/// Cartesian positions of the cart base, the wheel center and both wheel masses.
pub fn q2c(phi: f64, theta: f64, x: f64, r: f64, l: f64) -> CartesianFrame {
    let rel = phi - theta;
    let x1 = r * phi.sin() + l * rel.cos() + x;
    let x2 = r * phi.sin() - l * rel.cos() + x;
    let y1 = r * phi.cos() - l * rel.sin();
    let y2 = r * phi.cos() + l * rel.sin();
    let xp = (x1 + x2) / 2.0;
    let yp = (y1 + y2) / 2.0;
    CartesianFrame {
        xs: [x, xp, x1, xp, x2],
        ys: [0.0, yp, y1, yp, y2],
    }
}

pub fn trajectory_frames(traj: &Trajectory, r: f64, l: f64) -> Vec<CartesianFrame> {
    traj.states
        .iter()
        .map(|s| q2c(s[0], s[1], s[2], r, l))
        .collect()
}

const W: u32 = 1200;
const H: u32 = 600;

const TAB_BLUE: RGBColor = RGBColor(31, 119, 180);
const TAB_ORANGE: RGBColor = RGBColor(255, 127, 14);
const TAB_GREEN: RGBColor = RGBColor(44, 160, 44);
const TAB_RED: RGBColor = RGBColor(214, 39, 40);

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return -1.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad)..(hi + pad)
}

fn draw_time_panel(
    area: &Area<'_>,
    t: &[f64],
    series: &[(&str, Vec<f64>, RGBColor)],
    x_label: &str,
) -> Result<()> {
    let t_range = padded_range(t.iter().copied());
    let y_range = padded_range(series.iter().flat_map(|(_, ys, _)| ys.iter().copied()));
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(t_range, y_range)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(x_label)
        .draw()
        .map_err(plot_err)?;
    for (name, ys, color) in series {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                t.iter().copied().zip(ys.iter().copied()),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(*name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::MiddleRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

/// Square window around every point, so x and y share a scale on a square panel.
fn equal_aspect(frames: &[CartesianFrame]) -> (Range<f64>, Range<f64>) {
    let xr = padded_range(frames.iter().flat_map(|f| f.xs));
    let yr = padded_range(frames.iter().flat_map(|f| f.ys));
    let half = (xr.end - xr.start).max(yr.end - yr.start) / 2.0;
    let (cx, cy) = ((xr.start + xr.end) / 2.0, (yr.start + yr.end) / 2.0);
    ((cx - half)..(cx + half), (cy - half)..(cy + half))
}

fn draw_xy_panel(area: &Area<'_>, frames: &[CartesianFrame]) -> Result<()> {
    let (xr, yr) = equal_aspect(frames);
    let mut chart = ChartBuilder::on(area)
        .caption("x-y", ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(xr, yr)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("x")
        .y_desc("y")
        .draw()
        .map_err(plot_err)?;

    let tracks = [
        ("mass 1", MASS_1, TAB_ORANGE, 1),
        ("mass 2", MASS_2, TAB_GREEN, 1),
        ("pivot", PIVOT, TAB_BLUE, 3),
        ("base", BASE, BLACK, 3),
    ];
    for (name, idx, color, width) in tracks {
        chart
            .draw_series(LineSeries::new(
                frames.iter().map(|f| f.point(idx)),
                color.stroke_width(width),
            ))
            .map_err(plot_err)?
            .label(name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        let ends = [frames.first(), frames.last()];
        chart
            .draw_series(
                ends.into_iter()
                    .flatten()
                    .map(|f| Cross::new(f.point(idx), 6, color.stroke_width(2))),
            )
            .map_err(plot_err)?;
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::MiddleRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

/// Draws the result figure and encodes it as PNG.
pub fn render_png(traj: &Trajectory, r: f64, l: f64) -> Result<Vec<u8>> {
    let frames = trajectory_frames(traj, r, l);
    let (phi, theta, x) = (traj.column(0), traj.column(1), traj.column(2));
    let relative: Vec<f64> = phi.iter().zip(&theta).map(|(p, q)| p - q).collect();

    let mut pixel_buffer = vec![0u8; (W * H * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixel_buffer, (W, H)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        let (left, right) = root.split_horizontally((W / 2) as i32);
        let (top, bottom) = left.split_vertically((H / 2) as i32);

        draw_time_panel(
            &top,
            &traj.t,
            &[
                ("phi", phi, TAB_BLUE),
                ("phidot", traj.column(N), TAB_ORANGE),
                ("x", x, TAB_GREEN),
                ("xdot", traj.column(N + 2), TAB_RED),
            ],
            "",
        )?;
        draw_time_panel(
            &bottom,
            &traj.t,
            &[
                ("phi-theta", relative, TAB_BLUE),
                ("theta", theta, TAB_ORANGE),
                ("thetadot", traj.column(N + 1), TAB_GREEN),
            ],
            "t [sec]",
        )?;
        draw_xy_panel(&right, &frames)?;
        root.present().map_err(plot_err)?;
    }

    let img_buffer = image::RgbImage::from_raw(W, H, pixel_buffer)
        .ok_or_else(|| Error::Plot("pixel buffer has the wrong size".to_string()))?;
    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img_buffer)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(plot_err)?;
    Ok(png.into_inner())
}

pub fn save_plot(path: impl AsRef<Path>, traj: &Trajectory, r: f64, l: f64) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, render_png(traj, r, l)?)?;
    info!("Wrote plot to {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct SimResponse {
    success: bool,
    message: String,
    trajectory_image: String, // data:image/png;base64,...
    animation_data: AnimationData,
}

#[derive(Serialize, Default)]
struct AnimationData {
    t: Vec<f64>,
    positions: Vec<CartesianFrame>,
    limit: f64, // Half-width of a square view that contains every frame.
}

impl SimResponse {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            trajectory_image: String::new(),
            animation_data: AnimationData::default(),
        }
    }
}

fn view_limit(frames: &[CartesianFrame], r: f64, l: f64) -> f64 {
    let reach = frames
        .iter()
        .flat_map(|f| f.xs.iter().chain(f.ys.iter()))
        .fold(0.0f64, |m, v| m.max(v.abs()));
    reach + 0.25 * (r.abs() + l.abs())
}

/// POST /simulate with a JSON [`SimConfig`].
pub async fn simulate_handler(params: web::Json<SimConfig>) -> actix_web::Result<HttpResponse> {
    let cfg = params.into_inner();
    if cfg.equation_file.is_some() {
        return Ok(HttpResponse::Ok().json(SimResponse::failure(
            "equation files can only be loaded from the command line".to_string(),
        )));
    }

    let (r, l) = (cfg.r, cfg.l);
    let outcome = tokio::task::spawn_blocking(move || -> Result<(Trajectory, Vec<u8>)> {
        let traj = run_simulation(&cfg)?;
        let png = render_png(&traj, cfg.r, cfg.l)?;
        Ok((traj, png))
    })
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let (traj, png) = match outcome {
        Ok(done) => done,
        Err(e) => {
            warn!("simulation request failed: {e}");
            return Ok(HttpResponse::Ok().json(SimResponse::failure(e.to_string())));
        }
    };

    let positions = trajectory_frames(&traj, r, l);
    let limit = view_limit(&positions, r, l);
    Ok(HttpResponse::Ok().json(SimResponse {
        success: true,
        message: format!("simulated {} samples", traj.len()),
        trajectory_image: format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        ),
        animation_data: AnimationData {
            t: traj.t,
            positions,
            limit,
        },
    }))
}
