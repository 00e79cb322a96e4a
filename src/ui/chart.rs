use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;

use crate::error::{BotError, Result};

pub const WIDTH: u32 = 600;
pub const HEIGHT: u32 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub name: String,
    pub values: Vec<f64>,
}

fn chart_err<E: std::fmt::Display>(e: E) -> BotError {
    BotError::Chart(e.to_string())
}

/// Vertical bar chart, one labelled bar per entry, as PNG bytes.
pub fn render_bar_chart(title: &str, bars: &[(String, f64)]) -> Result<Vec<u8>> {
    if bars.is_empty() {
        return Err(BotError::Chart("no bars to draw".to_string()));
    }

    let max = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let top = if max > 0.0 { max * 1.1 } else { 1.0 };
    let labels: Vec<&str> = bars.iter().map(|(label, _)| label.as_str()).collect();

    let mut pixels = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(70)
            .build_cartesian_2d((0u32..bars.len() as u32).into_segmented(), 0f64..top)
            .map_err(chart_err)?;

        let label_for = |value: &SegmentValue<u32>| match value {
            SegmentValue::CenterOf(idx) | SegmentValue::Exact(idx) => labels
                .get(*idx as usize)
                .map(|label| label.to_string())
                .unwrap_or_default(),
            SegmentValue::Last => String::new(),
        };

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_label_formatter(&label_for)
            .y_label_formatter(&|v| format!("{:.0}", v))
            .draw()
            .map_err(chart_err)?;

        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(BLUE.mix(0.7).filled())
                    .margin(10)
                    .data(bars.iter().enumerate().map(|(idx, (_, v))| (idx as u32, *v))),
            )
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    encode_png(&pixels)
}

/// One line per series on shared axes, x = candle index starting at 1.
pub fn render_line_chart(title: &str, series: &[PriceSeries]) -> Result<Vec<u8>> {
    let points = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    if points == 0 {
        return Err(BotError::Chart("no points to draw".to_string()));
    }

    let (lo, hi) = value_range(series);

    let mut pixels = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(70)
            .build_cartesian_2d(1f64..points.max(2) as f64, lo..hi)
            .map_err(chart_err)?;

        chart.configure_mesh().draw().map_err(chart_err)?;

        for (idx, s) in series.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            chart
                .draw_series(LineSeries::new(
                    s.values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| ((i + 1) as f64, *v)),
                    color.stroke_width(2),
                ))
                .map_err(chart_err)?
                .label(s.name.clone())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    encode_png(&pixels)
}

/// Y range covering every value with a little headroom; flat data gets a
/// unit-wide band so the axis is never empty.
fn value_range(series: &[PriceSeries]) -> (f64, f64) {
    let values = series.iter().flat_map(|s| s.values.iter().copied());
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = (hi - lo) * 0.05;
    if pad > 0.0 {
        (lo - pad, hi + pad)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

fn encode_png(pixels: &[u8]) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(pixels, WIDTH, HEIGHT, ColorType::Rgb8)
        .map_err(chart_err)?;
    Ok(png)
}
