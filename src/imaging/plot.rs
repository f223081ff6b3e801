use crate::{
    error::{RavenError, Result},
    imaging::colour::AXIS,
};
use log::trace;
use std::path::{Path as FsPath, PathBuf};
use svg::{
    node::{
        element::{Line, Path, Rectangle, Text},
        Text as TextNode,
    },
    Document,
};

const WIDTH: f64 = 800.;
const HEIGHT: f64 = 480.;
const MARGIN: f64 = 64.;
const TICKS: usize = 5;

/* # layers */

#[derive(Clone, Debug)]
enum Layer {
    Line {
        points: Vec<(f64, f64)>,
        paint: String,
        width: f64,
    },
    Band {
        lower: Vec<(f64, f64)>,
        upper: Vec<(f64, f64)>,
        paint: String,
    },
    Bars {
        // (left, right, height)
        bars: Vec<(f64, f64, f64)>,
        paint: String,
    },
}

impl Layer {
    fn points(&self) -> Box<dyn Iterator<Item = (f64, f64)> + '_> {
        match self {
            Layer::Line { points, .. } => Box::new(points.iter().copied()),
            Layer::Band { lower, upper, .. } => {
                Box::new(lower.iter().chain(upper.iter()).copied())
            }
            Layer::Bars { bars, .. } => Box::new(
                bars.iter()
                    .flat_map(|(x0, x1, h)| [(*x0, 0.), (*x1, *h)]),
            ),
        }
    }
}

/// data extent mapped onto the drawing frame
#[derive(Clone, Copy, Debug, PartialEq)]
struct Frame {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
}

impl Frame {
    fn fit(points: impl Iterator<Item = (f64, f64)>) -> Option<Self> {
        let mut frame: Option<Frame> = None;
        for (x, y) in points.filter(|(x, y)| x.is_finite() && y.is_finite()) {
            frame = Some(match frame {
                None => Frame {
                    x0: x,
                    x1: x,
                    y0: y,
                    y1: y,
                },
                Some(f) => Frame {
                    x0: f.x0.min(x),
                    x1: f.x1.max(x),
                    y0: f.y0.min(y),
                    y1: f.y1.max(y),
                },
            });
        }
        // flat extents still get a drawable span
        frame.map(|mut f| {
            if f.x1 - f.x0 <= f64::EPSILON {
                f.x0 -= 0.5;
                f.x1 += 0.5;
            }
            if f.y1 - f.y0 <= f64::EPSILON {
                f.y0 -= 0.5;
                f.y1 += 0.5;
            }
            f
        })
    }

    fn x(&self, x: f64) -> f64 {
        MARGIN + (x - self.x0) / (self.x1 - self.x0) * (WIDTH - 2. * MARGIN)
    }

    fn y(&self, y: f64) -> f64 {
        HEIGHT - MARGIN - (y - self.y0) / (self.y1 - self.y0) * (HEIGHT - 2. * MARGIN)
    }
}

/* # geometry to svg */

/// polyline path, broken wherever a value is missing
fn line_to_svg(points: &[(f64, f64)], frame: &Frame) -> String {
    let mut d = String::new();
    let mut pen_down = false;
    for (x, y) in points {
        if !(x.is_finite() && y.is_finite()) {
            pen_down = false;
            continue;
        }
        d.push_str(&format!(
            "{}{:.2} {:.2}",
            if pen_down { "L" } else { "M" },
            frame.x(*x),
            frame.y(*y)
        ));
        pen_down = true;
    }
    d
}

fn band_to_svg(lower: &[(f64, f64)], upper: &[(f64, f64)], frame: &Frame) -> String {
    let ring = upper
        .iter()
        .chain(lower.iter().rev())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| format!("{:.2} {:.2}", frame.x(*x), frame.y(*y)))
        .collect::<Vec<String>>();
    if ring.is_empty() {
        String::new()
    } else {
        format!("M{}Z", ring.join("L"))
    }
}

fn label(text: &str, x: f64, y: f64, anchor: &str) -> Text {
    Text::new()
        .set("x", x)
        .set("y", y)
        .set("font-family", "sans-serif")
        .set("font-size", 12)
        .set("text-anchor", anchor)
        .add(TextNode::new(text))
}

fn tick_label(value: f64, span: f64) -> String {
    if span >= 100. {
        format!("{:.0}", value)
    } else if span >= 1. {
        format!("{:.1}", value)
    } else {
        format!("{:.3}", value)
    }
}

/* # figures */

/// a single panel line chart
#[derive(Clone, Debug)]
pub struct Figure {
    title: String,
    x_label: String,
    y_label: String,
    layers: Vec<Layer>,
    legend: Vec<(String, String)>,
    x_ticks: Option<Vec<(f64, String)>>,
}

impl Figure {
    pub fn new(title: impl Into<String>, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            layers: Vec::new(),
            legend: Vec::new(),
            x_ticks: None,
        }
    }

    pub fn line(mut self, points: Vec<(f64, f64)>, paint: String, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.legend.push((name.to_string(), paint.clone()));
        }
        self.layers.push(Layer::Line {
            points,
            paint,
            width: 1.5,
        });
        self
    }

    /// thin line without a legend entry
    pub fn trace(mut self, points: Vec<(f64, f64)>, paint: String) -> Self {
        self.layers.push(Layer::Line {
            points,
            paint,
            width: 0.75,
        });
        self
    }

    pub fn band(
        mut self,
        lower: Vec<(f64, f64)>,
        upper: Vec<(f64, f64)>,
        paint: String,
        name: &str,
    ) -> Self {
        self.legend.push((name.to_string(), paint.clone()));
        self.layers.push(Layer::Band {
            lower,
            upper,
            paint,
        });
        self
    }

    pub fn bars(mut self, bars: Vec<(f64, f64, f64)>, paint: String, name: &str) -> Self {
        self.legend.push((name.to_string(), paint.clone()));
        self.layers.push(Layer::Bars { bars, paint });
        self
    }

    /// labelled x positions replacing the numeric ticks
    pub fn x_ticks(mut self, ticks: Vec<(f64, String)>) -> Self {
        self.x_ticks = Some(ticks);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn render(&self) -> Result<Document> {
        let frame = Frame::fit(self.layers.iter().flat_map(|layer| layer.points()))
            .ok_or_else(|| RavenError::validation(&self.title, "nothing to plot"))?;
        trace!("rendering figure {} over {:?}", self.title, frame);

        let mut image = Document::new()
            .set("viewBox", (0, 0, WIDTH, HEIGHT))
            .set("width", WIDTH)
            .set("height", HEIGHT)
            .add(
                Rectangle::new()
                    .set("width", WIDTH)
                    .set("height", HEIGHT)
                    .set("fill", "white"),
            );

        for layer in &self.layers {
            image = match layer {
                Layer::Line {
                    points,
                    paint,
                    width,
                } => image.add(
                    Path::new()
                        .set("d", line_to_svg(points, &frame))
                        .set("fill", "none")
                        .set("stroke", paint.as_str())
                        .set("stroke-width", *width),
                ),
                Layer::Band {
                    lower,
                    upper,
                    paint,
                } => image.add(
                    Path::new()
                        .set("d", band_to_svg(lower, upper, &frame))
                        .set("fill", paint.as_str())
                        .set("fill-opacity", 0.6)
                        .set("stroke", "none"),
                ),
                Layer::Bars { bars, paint } => {
                    bars.iter().fold(image, |image, (x0, x1, h)| {
                        image.add(
                            Rectangle::new()
                                .set("x", frame.x(*x0))
                                .set("y", frame.y(*h))
                                .set("width", frame.x(*x1) - frame.x(*x0))
                                .set("height", frame.y(frame.y0.max(0.)) - frame.y(*h))
                                .set("fill", paint.as_str())
                                .set("stroke", "white"),
                        )
                    })
                }
            };
        }

        Ok(self.axes(image, &frame))
    }

    fn axes(&self, mut image: Document, frame: &Frame) -> Document {
        let paint = AXIS.paint();
        let (left, right) = (MARGIN, WIDTH - MARGIN);
        let (top, bottom) = (MARGIN, HEIGHT - MARGIN);
        image = image
            .add(
                Line::new()
                    .set("x1", left)
                    .set("y1", bottom)
                    .set("x2", right)
                    .set("y2", bottom)
                    .set("stroke", paint.as_str()),
            )
            .add(
                Line::new()
                    .set("x1", left)
                    .set("y1", top)
                    .set("x2", left)
                    .set("y2", bottom)
                    .set("stroke", paint.as_str()),
            );

        let x_ticks = match &self.x_ticks {
            Some(ticks) => ticks.clone(),
            None => (0..=TICKS)
                .map(|i| {
                    let x = frame.x0 + (frame.x1 - frame.x0) * i as f64 / TICKS as f64;
                    (x, tick_label(x, frame.x1 - frame.x0))
                })
                .collect(),
        };
        for (x, text) in x_ticks
            .iter()
            .filter(|(x, _)| *x >= frame.x0 && *x <= frame.x1)
        {
            image = image.add(label(text, frame.x(*x), bottom + 16., "middle"));
        }
        for i in 0..=TICKS {
            let y = frame.y0 + (frame.y1 - frame.y0) * i as f64 / TICKS as f64;
            image = image.add(label(
                &tick_label(y, frame.y1 - frame.y0),
                left - 6.,
                frame.y(y) + 4.,
                "end",
            ));
        }

        image = image
            .add(label(&self.title, WIDTH / 2., top / 2., "middle").set("font-size", 16))
            .add(label(&self.x_label, WIDTH / 2., HEIGHT - 16., "middle"))
            .add(
                label(&self.y_label, 16., HEIGHT / 2., "middle")
                    .set("transform", format!("rotate(-90 16 {})", HEIGHT / 2.)),
            );

        for (index, (name, paint)) in self.legend.iter().enumerate() {
            let y = top + 16. * index as f64;
            image = image
                .add(
                    Rectangle::new()
                        .set("x", right - 120.)
                        .set("y", y - 9.)
                        .set("width", 10)
                        .set("height", 10)
                        .set("fill", paint.as_str()),
                )
                .add(label(name, right - 104., y, "start"));
        }
        image
    }

    /// render and write the figure, returning where it went
    pub fn save(&self, path: &FsPath) -> Result<PathBuf> {
        let image = self.render()?;
        svg::save(path, &image)?;
        trace!("saved {}", path.display());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::imaging::colour::SIMULATED;
    use float_eq::assert_float_eq;

    #[test]
    fn frame_maps_corners() {
        let frame = Frame::fit([(0., 10.), (4., 20.)].into_iter()).unwrap();
        assert_float_eq!(frame.x(0.), MARGIN, abs <= 1e-9);
        assert_float_eq!(frame.x(4.), WIDTH - MARGIN, abs <= 1e-9);
        assert_float_eq!(frame.y(10.), HEIGHT - MARGIN, abs <= 1e-9);
        assert_float_eq!(frame.y(20.), MARGIN, abs <= 1e-9);
    }

    #[test]
    fn flat_frames_are_widened() {
        let frame = Frame::fit([(1., 3.), (1., 3.), (f64::NAN, 9.)].into_iter()).unwrap();
        assert_eq!(frame.x0, 0.5);
        assert_eq!(frame.y1, 3.5);
        assert!(Frame::fit([(f64::NAN, 1.)].into_iter()).is_none());
    }

    #[test]
    fn gaps_lift_the_pen() {
        let frame = Frame::fit([(0., 0.), (2., 2.)].into_iter()).unwrap();
        let d = line_to_svg(&[(0., 0.), (1., f64::NAN), (2., 2.)], &frame);
        assert_eq!(d.matches('M').count(), 2);
        assert!(!d.contains('L'));
    }

    #[test]
    fn empty_figure() {
        assert!(Figure::new("empty", "x", "y").render().is_err());
    }

    #[test]
    fn saved_figure() {
        let dir = tempfile::tempdir().unwrap();
        let path = Figure::new("flows", "day", "discharge")
            .line(vec![(0., 1.), (1., 3.)], SIMULATED.paint(), Some("simulated"))
            .save(&dir.path().join("flows.svg"))
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("<svg"));
        assert!(text.contains("simulated"));
        assert!(text.contains(&SIMULATED.paint()));
    }
}
