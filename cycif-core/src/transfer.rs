//! Per-channel transfer functions.
//!
//! A transfer function is a quantized colour ramp: `num_bins` RGB entries
//! linearly interpolated from a start colour to an end colour. The numeric
//! domain `[min, max]` only decides which bin a raw intensity lands in; it
//! never changes the colours stored in the table.
//!
//! Tables are immutable. Changing any parameter builds a new table.

/// An RGB triple.
pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];

/// Default table resolution.
pub const DEFAULT_BINS: usize = 1024;

/// Full 16-bit intensity domain, used for freshly configured channels.
pub const DEFAULT_DOMAIN: (f64, f64) = (0.0, 65535.0);

/// Which path `classify` took for a raw value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sample {
    /// Raw value fell under `min`; rendered as pure black.
    BelowThreshold,
    /// Raw value mapped into the table at this bin.
    Bin(usize),
}

#[derive(Clone, Debug)]
pub struct TransferFunction {
    min: f64,
    max: f64,
    start: Rgb,
    end: Rgb,
    table: Vec<Rgb>,
}

impl TransferFunction {
    /// Build a table of `num_bins` entries from `start` to `end`.
    ///
    /// A degenerate domain (`max <= min`) is accepted; `lookup` clamps.
    pub fn build(min: f64, max: f64, start: Rgb, end: Rgb, num_bins: usize) -> Self {
        let n = num_bins.max(1);
        let denom = (n - 1).max(1) as f64;
        let table = (0..n)
            .map(|i| {
                let t = i as f64 / denom;
                [
                    lerp(start[0], end[0], t),
                    lerp(start[1], end[1], t),
                    lerp(start[2], end[2], t),
                ]
            })
            .collect();
        Self { min, max, start, end, table }
    }

    /// Default ramp for a newly configured channel: black to white over 16 bits.
    pub fn default_ramp(num_bins: usize) -> Self {
        Self::build(DEFAULT_DOMAIN.0, DEFAULT_DOMAIN.1, BLACK, WHITE, num_bins)
    }

    pub fn min(&self) -> f64 { self.min }
    pub fn max(&self) -> f64 { self.max }
    pub fn start_color(&self) -> Rgb { self.start }
    pub fn end_color(&self) -> Rgb { self.end }
    pub fn num_bins(&self) -> usize { self.table.len() }
    pub fn table(&self) -> &[Rgb] { &self.table }

    /// Copy of this function over a new domain, colours kept.
    pub fn with_range(&self, min: f64, max: f64) -> Self {
        Self::build(min, max, self.start, self.end, self.table.len())
    }

    /// Copy of this function with new endpoint colours, domain kept.
    pub fn with_colors(&self, start: Rgb, end: Rgb) -> Self {
        Self::build(self.min, self.max, start, end, self.table.len())
    }

    /// Decide how a raw value is rendered.
    ///
    /// The bin index is clamped to the table even when the domain is empty,
    /// inverted, or produces NaN/infinity.
    #[inline]
    pub fn classify(&self, raw: f64) -> Sample {
        if raw < self.min {
            return Sample::BelowThreshold;
        }
        let last = self.table.len() - 1;
        let pos = ((raw - self.min) / (self.max - self.min) * last as f64).round();
        let bin = if pos.is_nan() || pos <= 0.0 {
            0
        } else if pos >= last as f64 {
            last
        } else {
            pos as usize
        };
        Sample::Bin(bin)
    }

    /// Colour for a raw intensity value.
    #[inline]
    pub fn lookup(&self, raw: f64) -> Rgb {
        match self.classify(raw) {
            Sample::BelowThreshold => BLACK,
            Sample::Bin(bin) => self.table[bin],
        }
    }
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    let v = a as f64 + (b as f64 - a as f64) * t;
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_and_length() {
        for &n in &[2usize, 4, 17, 1024] {
            let tf = TransferFunction::build(0.0, 1.0, [10, 200, 30], [250, 5, 128], n);
            assert_eq!(tf.num_bins(), n);
            assert_eq!(tf.table()[0], [10, 200, 30]);
            assert_eq!(tf.table()[n - 1], [250, 5, 128]);
        }
    }

    #[test]
    fn test_four_bin_scenario() {
        let tf = TransferFunction::build(100.0, 200.0, BLACK, WHITE, 4);
        assert_eq!(tf.classify(100.0), Sample::Bin(0));
        assert_eq!(tf.lookup(100.0), tf.table()[0]);
        // (150 - 100) / 100 * 3 = 1.5, rounds to 2
        assert_eq!(tf.classify(150.0), Sample::Bin(2));
        assert_eq!(tf.lookup(150.0), tf.table()[2]);
        assert_eq!(tf.lookup(250.0), WHITE);
        // Black either way, but it must come from the threshold path.
        assert_eq!(tf.classify(50.0), Sample::BelowThreshold);
        assert_eq!(tf.lookup(50.0), BLACK);
    }

    #[test]
    fn test_below_min_is_black_even_with_coloured_start() {
        let tf = TransferFunction::build(10.0, 20.0, [90, 90, 90], WHITE, 8);
        assert_eq!(tf.classify(9.999), Sample::BelowThreshold);
        assert_eq!(tf.lookup(9.999), BLACK);
        assert_eq!(tf.lookup(10.0), [90, 90, 90]);
    }

    #[test]
    fn test_at_or_above_max_hits_last_bin() {
        let tf = TransferFunction::build(0.0, 1000.0, BLACK, [0, 255, 0], 64);
        for raw in [1000.0, 1000.5, 65535.0, f64::INFINITY] {
            assert_eq!(tf.classify(raw), Sample::Bin(63));
            assert_eq!(tf.lookup(raw), [0, 255, 0]);
        }
    }

    #[test]
    fn test_degenerate_domain_stays_in_bounds() {
        let flat = TransferFunction::build(500.0, 500.0, [1, 2, 3], [4, 5, 6], 16);
        // 0/0 is NaN, clamps to the first bin
        assert_eq!(flat.classify(500.0), Sample::Bin(0));
        // x/0 is +inf, clamps to the last bin
        assert_eq!(flat.classify(501.0), Sample::Bin(15));

        let inverted = TransferFunction::build(800.0, 100.0, BLACK, WHITE, 16);
        assert_eq!(inverted.classify(900.0), Sample::Bin(0));
        assert_eq!(inverted.classify(799.0), Sample::BelowThreshold);
    }

    #[test]
    fn test_with_range_keeps_colors() {
        let tf = TransferFunction::build(0.0, 10.0, [5, 5, 5], [200, 0, 0], 32);
        let moved = tf.with_range(100.0, 300.0);
        assert_eq!(moved.start_color(), [5, 5, 5]);
        assert_eq!(moved.end_color(), [200, 0, 0]);
        assert_eq!(moved.min(), 100.0);
        assert_eq!(moved.num_bins(), 32);

        let recolored = moved.with_colors(BLACK, [0, 0, 255]);
        assert_eq!(recolored.max(), 300.0);
        assert_eq!(recolored.table()[31], [0, 0, 255]);
    }
}
