/* # colour spaces */

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HSB {
    // all values are in the [0,1] interval
    hue: f64,
    sat: f64,
    brt: f64,
}

impl HSB {
    pub fn new(hue: f64, sat: f64, brt: f64) -> Self {
        HSB {
            hue: hue.rem_euclid(1.0),
            sat: sat.clamp(0.0, 1.0),
            brt: brt.clamp(0.0, 1.0),
        }
    }

    pub fn paint(&self) -> String {
        RGB::from(*self).paint()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RGB {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RGB {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        RGB { r, g, b }
    }

    /// svg `fill` and `stroke` value
    pub fn paint(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl From<HSB> for RGB {
    fn from(hsb: HSB) -> Self {
        // channel n of the hexcone, n = 5, 3, 1 for red, green, blue
        let channel = |n: f64| {
            let k = (n + hsb.hue * 6.0) % 6.0;
            let ramp = k.min(4.0 - k).clamp(0.0, 1.0);
            (255.0 * hsb.brt * (1.0 - hsb.sat * ramp)).round() as u8
        };
        RGB::new(channel(5.0), channel(3.0), channel(1.0))
    }
}

/* # inks */

pub const SIMULATED: RGB = RGB::new(31, 119, 180);
pub const OBSERVED: RGB = RGB::new(30, 30, 30);
pub const BAND: RGB = RGB::new(174, 199, 232);
pub const TREND: RGB = RGB::new(214, 39, 40);
pub const AXIS: RGB = RGB::new(90, 90, 90);

pub trait Ink<T> {
    fn paint(&self, sample: T) -> String;
}

/// evenly spread hues, one per line of a spaghetti plot
pub struct WheelInk {
    count: usize,
}

impl WheelInk {
    pub fn new(count: usize) -> Self {
        WheelInk {
            count: count.max(1),
        }
    }
}

impl Ink<usize> for WheelInk {
    fn paint(&self, sample: usize) -> String {
        // stop short of red so the first and last lines differ
        HSB::new(0.8 * sample as f64 / self.count as f64, 0.55, 0.85).paint()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hsb2rgb() {
        assert_eq!(RGB::from(HSB::new(0.0, 1.0, 1.0)), RGB::new(255, 0, 0));
        assert_eq!(RGB::from(HSB::new(1.0 / 3.0, 1.0, 1.0)).g, 255);
        assert_eq!(RGB::from(HSB::new(2.0 / 3.0, 1.0, 1.0)).b, 255);
        assert_eq!(HSB::new(0.5, 0.0, 1.0).paint(), "rgb(255, 255, 255)");
        assert_eq!(HSB::new(0.2, 1.0, 0.0).paint(), "rgb(0, 0, 0)");
    }

    #[test]
    fn wheel_is_distinct() {
        let ink = WheelInk::new(4);
        let paints = (0..4).map(|i| ink.paint(i)).collect::<Vec<String>>();
        for (i, a) in paints.iter().enumerate() {
            for b in &paints[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(WheelInk::new(0).paint(0), HSB::new(0.0, 0.55, 0.85).paint());
    }
}
