use crate::numerical::dual::Scalar;
use crate::numerical::mathfn::quadratic_plus;

/// Basin geometry: a piecewise linear level-to-area relation, with the
/// storage at each breakpoint derived by integrating area over level.
/// Between breakpoints storage is quadratic in level, so the inverse
/// level-of-storage solves a quadratic per segment.
///
/// Below the bottom the level extrapolates constantly; above the top
/// breakpoint the profile extends with the top area.
#[derive(Clone, Debug)]
pub struct BasinProfile {
    level: Vec<f64>,
    area: Vec<f64>,
    storage: Vec<f64>,
}

impl BasinProfile {
    pub fn new(level: Vec<f64>, area: Vec<f64>) -> Result<Self, String> {
        if level.len() < 2 {
            return Err("basin profile needs at least two rows".to_string());
        }
        if level.len() != area.len() {
            return Err("basin profile level and area columns differ in length".to_string());
        }
        for i in 1..level.len() {
            if level[i] <= level[i - 1] {
                return Err(format!("basin profile level not increasing at row {}", i));
            }
        }
        for (i, a) in area.iter().enumerate() {
            if *a <= 0.0 {
                return Err(format!("basin profile area not positive at row {}", i));
            }
            if i > 0 && *a < area[i - 1] {
                return Err(format!("basin profile area decreases at row {}", i));
            }
        }

        // Trapezoidal integration of area over level gives the exact
        // storage of the piecewise linear profile.
        let mut storage = vec![0.0; level.len()];
        for i in 1..level.len() {
            let dh = level[i] - level[i - 1];
            storage[i] = storage[i - 1] + 0.5 * (area[i] + area[i - 1]) * dh;
        }
        Ok(Self { level, area, storage })
    }

    pub fn bottom(&self) -> f64 {
        self.level[0]
    }

    pub fn top(&self) -> f64 {
        self.level[self.level.len() - 1]
    }

    /// The largest profile area. Precipitation falls on this area no
    /// matter the current level.
    pub fn fixed_area(&self) -> f64 {
        self.area[self.area.len() - 1]
    }

    pub fn max_storage(&self) -> f64 {
        self.storage[self.storage.len() - 1]
    }

    /// Storage held below a given level.
    pub fn storage_from_level(&self, level: f64) -> f64 {
        let n = self.level.len();
        if level <= self.level[0] {
            return 0.0;
        }
        if level >= self.level[n - 1] {
            return self.storage[n - 1] + self.area[n - 1] * (level - self.level[n - 1]);
        }
        let i = self.segment_by_level(level);
        let dh = level - self.level[i];
        let slope = (self.area[i + 1] - self.area[i]) / (self.level[i + 1] - self.level[i]);
        self.storage[i] + self.area[i] * dh + 0.5 * slope * dh * dh
    }

    /// Water level for a given storage. Negative storages (the smoothing
    /// keeps them transient) report the bottom level.
    pub fn level_from_storage<S: Scalar>(&self, storage: S) -> S {
        let n = self.level.len();
        let s = storage.value();
        if s <= 0.0 {
            return S::constant(self.level[0]);
        }
        if s >= self.storage[n - 1] {
            return (storage - self.storage[n - 1]) / self.area[n - 1] + self.level[n - 1];
        }
        let i = self.segment_by_storage(s);
        let slope = (self.area[i + 1] - self.area[i]) / (self.level[i + 1] - self.level[i]);
        let ds = storage - self.storage[i];
        // 0.5*slope*dh^2 + area_i*dh - ds = 0, take the physical root
        let dh = quadratic_plus(0.5 * slope, self.area[i], -ds);
        dh + self.level[i]
    }

    /// Wetted surface area at a given level.
    pub fn area_from_level<S: Scalar>(&self, level: S) -> S {
        let n = self.level.len();
        let h = level.value();
        if h <= self.level[0] {
            return S::constant(self.area[0]);
        }
        if h >= self.level[n - 1] {
            return S::constant(self.area[n - 1]);
        }
        let i = self.segment_by_level(h);
        let slope = (self.area[i + 1] - self.area[i]) / (self.level[i + 1] - self.level[i]);
        (level - self.level[i]) * slope + self.area[i]
    }

    fn segment_by_level(&self, h: f64) -> usize {
        let i = self.level.partition_point(|&v| v <= h);
        if i == 0 {
            0
        } else {
            (i - 1).min(self.level.len() - 2)
        }
    }

    fn segment_by_storage(&self, s: f64) -> usize {
        let i = self.storage.partition_point(|&v| v <= s);
        if i == 0 {
            0
        } else {
            (i - 1).min(self.storage.len() - 2)
        }
    }
}
