//! Human-readable size reporting.

use std::fmt;

const KIB: u64 = 1_024;
const MIB: u64 = 1_024 * 1_024;

#[allow(clippy::cast_precision_loss)] // file sizes are far below 2^52
fn to_f64(bytes: u64) -> f64 {
    bytes as f64
}

/// Size in mebibytes with 2 decimal places, e.g. `1.25 MB`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Megabytes(pub(crate) u64);

impl fmt::Display for Megabytes {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:.2} MB", to_f64(self.0) / to_f64(MIB))
    }
}

/// Size in the largest fitting unit among B / KB / MB.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HumanSize(pub(crate) u64);

impl fmt::Display for HumanSize {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes < KIB {
            write!(formatter, "{bytes} B")
        } else if bytes < MIB {
            write!(formatter, "{:.2} KB", to_f64(bytes) / to_f64(KIB))
        } else {
            write!(formatter, "{:.2} MB", to_f64(bytes) / to_f64(MIB))
        }
    }
}

/// Relative size reduction in percent, or `None` if the original size is zero.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reduction {
    original: u64,
    new: u64,
}

impl Reduction {
    pub(crate) fn new(original: u64, new: u64) -> Self {
        Self { original, new }
    }

    pub(crate) fn percent(self) -> Option<f64> {
        if self.original == 0 {
            return None;
        }
        let diff = to_f64(self.original) - to_f64(self.new);
        Some(diff / to_f64(self.original) * 100.0)
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(percent) => write!(formatter, "{percent:.2}%"),
            None => formatter.write_str("n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_casing::test_casing;

    use super::*;

    #[test_casing(6, [
        (0, "0 B"),
        (1_023, "1023 B"),
        (1_024, "1.00 KB"),
        (1_536, "1.50 KB"),
        (1_048_576, "1.00 MB"),
        (6_815_744, "6.50 MB"),
    ])]
    fn formatting_human_size(bytes: u64, expected: &str) {
        assert_eq!(HumanSize(bytes).to_string(), expected);
    }

    #[test]
    fn formatting_megabytes() {
        assert_eq!(Megabytes(0).to_string(), "0.00 MB");
        assert_eq!(Megabytes(524_288).to_string(), "0.50 MB");
        assert_eq!(Megabytes(7_340_032).to_string(), "7.00 MB");
    }

    #[test]
    fn computing_reduction() {
        assert_eq!(Reduction::new(200, 50).to_string(), "75.00%");
        assert_eq!(Reduction::new(100, 100).to_string(), "0.00%");
        assert_eq!(Reduction::new(100, 150).to_string(), "-50.00%");
        assert_eq!(Reduction::new(0, 10).percent(), None);
        assert_eq!(Reduction::new(0, 10).to_string(), "n/a");
    }
}
