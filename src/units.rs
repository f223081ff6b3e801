pub trait Unit<T> {
    fn confine(value: T) -> Self;
    fn release(self) -> T;
}

macro_rules! impl_unit {
    ($unit:ident) => {
        #[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
        pub struct $unit(f64);

        impl Unit<f64> for $unit {
            fn confine(value: f64) -> Self {
                Self(value)
            }

            fn release(self) -> f64 {
                self.0
            }
        }
    };
}

// square kilometers
impl_unit!(Area);
// meters above sea level
impl_unit!(Elevation);
// cubic meters per second
impl_unit!(Discharge);

impl Area {
    pub fn square_meters(self) -> f64 {
        self.0 * 1e6
    }
}

impl Discharge {
    /// runoff depth in mm/day over a drainage area
    pub fn depth(self, area: Area) -> f64 {
        self.0 * 86400. / area.square_meters() * 1000.
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn confine_release() {
        assert_eq!(Elevation::confine(843.).release(), 843.);
    }

    #[test]
    fn runoff_depth() {
        // 1 m3/s over 86.4 km2 is one millimeter a day
        assert_float_eq!(
            Discharge::confine(1.).depth(Area::confine(86.4)),
            1.0,
            abs <= 1e-9
        );
    }
}
